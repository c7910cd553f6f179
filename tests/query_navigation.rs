//! Data queries, repository navigation and the CDS endpoint probe.

mod support;

use mcp_abap_adt::adt::navigation::DependencyLevel;
use mcp_abap_adt::adt::ObjectKind;
use mcp_abap_adt::error::AdtError;
use support::*;

const T000_RESULT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
    <dataPreview:tableData xmlns:dataPreview="http://www.sap.com/adt/dataPreview">
      <dataPreview:totalRows>2</dataPreview:totalRows>
      <dataPreview:columns>
        <dataPreview:metadata dataPreview:name="MANDT" dataPreview:type="C" dataPreview:keyAttribute="true"/>
        <dataPreview:dataSet>
          <dataPreview:data>001</dataPreview:data>
          <dataPreview:data>001</dataPreview:data>
        </dataPreview:dataSet>
      </dataPreview:columns>
      <dataPreview:columns>
        <dataPreview:metadata dataPreview:name="MTEXT" dataPreview:type="C"/>
        <dataPreview:dataSet>
          <dataPreview:data>Client one</dataPreview:data>
          <dataPreview:data>Client copy</dataPreview:data>
        </dataPreview:dataSet>
      </dataPreview:columns>
    </dataPreview:tableData>"#;

#[tokio::test]
async fn bare_table_name_and_explicit_select_issue_the_same_query() {
    let exec = ScriptedExec::new(vec![
        csrf_fetch_ok("token-1"),
        ok_xml(T000_RESULT),
        ok_xml(T000_RESULT),
    ]);
    let client = client_with(exec.clone());

    let sugar = client.run_query("T000", 10).await.unwrap();
    let explicit = client.run_query("SELECT * FROM T000", 10).await.unwrap();

    let requests = exec.requests();
    let bodies: Vec<&str> = requests
        .iter()
        .filter(|r| r.path == "/sap/bc/adt/datapreview/freestyle")
        .map(|r| r.body.as_str())
        .collect();
    assert_eq!(bodies, vec!["SELECT * FROM T000", "SELECT * FROM T000"]);

    let sugar_columns: Vec<&str> = sugar.columns.iter().map(|c| c.name.as_str()).collect();
    let explicit_columns: Vec<&str> = explicit.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(sugar_columns, explicit_columns);
}

#[tokio::test]
async fn filtered_rows_carry_the_filter_value() {
    let exec = ScriptedExec::new(vec![csrf_fetch_ok("token-1"), ok_xml(T000_RESULT)]);
    let client = client_with(exec.clone());

    let contents = client
        .run_query("SELECT * FROM T000 WHERE MANDT = '001'", 10)
        .await
        .unwrap();
    for row in &contents.rows {
        assert_eq!(row["MANDT"], serde_json::Value::String("001".into()));
    }
    assert!(exec.requests()[1].query_contains("rowNumber=10"));
}

#[tokio::test]
async fn malformed_sql_preserves_the_server_message() {
    let exec = ScriptedExec::new(vec![
        csrf_fetch_ok("token-1"),
        adt_exception(
            400,
            "ExceptionInvalidQuery",
            "Unable to parse the SQL statement near FORM",
        ),
    ]);
    let client = client_with(exec);

    let err = client.run_query("SELECT FORM WHERE", 10).await.unwrap_err();
    match err {
        AdtError::Adt { kind, message, .. } => {
            assert_eq!(kind, "ExceptionInvalidQuery");
            assert!(message.contains("near FORM"));
        }
        other => panic!("expected adt exception, got {other:?}"),
    }
}

const CDS_TREE: &str = r#"<cds:dependencyTree xmlns:cds="http://www.sap.com/adt/cds">
      <node name="Z_SALES" type="CDS_VIEW" activationState="active">
        <children>
          <node name="VBAK" type="TABLE" relation="FROM" activationState="active"/>
        </children>
      </node>
    </cds:dependencyTree>"#;

#[tokio::test]
async fn cds_probe_falls_back_to_the_per_source_path_and_remembers_it() {
    let exec = ScriptedExec::new(vec![
        not_found(),      // dedicated endpoint missing on this system
        ok_xml(CDS_TREE), // per-source fallback
        ok_xml(CDS_TREE), // second call goes straight to the fallback
    ]);
    let client = client_with(exec.clone());

    let tree = client
        .cds_dependencies("Z_SALES", DependencyLevel::Unit, false)
        .await
        .unwrap();
    assert_eq!(tree.name, "Z_SALES");
    assert_eq!(tree.children.len(), 1);

    client
        .cds_dependencies("Z_SALES", DependencyLevel::Hierarchy, false)
        .await
        .unwrap();

    let paths: Vec<String> = exec.requests().iter().map(|r| r.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            "/sap/bc/adt/cds/dependencies".to_string(),
            "/sap/bc/adt/ddic/ddl/sources/Z_SALES/dependencies".to_string(),
            "/sap/bc/adt/ddic/ddl/sources/Z_SALES/dependencies".to_string(),
        ]
    );
}

#[tokio::test]
async fn cds_dedicated_endpoint_is_used_when_present() {
    let exec = ScriptedExec::new(vec![ok_xml(CDS_TREE), ok_xml(CDS_TREE)]);
    let client = client_with(exec.clone());

    client
        .cds_dependencies("Z_SALES", DependencyLevel::Unit, true)
        .await
        .unwrap();
    client
        .cds_dependencies("Z_SALES", DependencyLevel::Unit, true)
        .await
        .unwrap();

    let requests = exec.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.path == "/sap/bc/adt/cds/dependencies"));
    assert!(requests[0].query_contains("name=Z_SALES"));
    assert!(requests[0].query_contains("withAssociations=true"));
}

#[tokio::test]
async fn search_returns_an_empty_list_for_no_hits() {
    let exec = ScriptedExec::new(vec![ok_xml(
        r#"<adtcore:objectReferences xmlns:adtcore="http://www.sap.com/adt/core"/>"#,
    )]);
    let client = client_with(exec.clone());

    let results = client.search_objects("CL_*", 10).await.unwrap();
    assert!(results.is_empty());

    let request = &exec.requests()[0];
    assert!(request.query_contains("operation=quickSearch"));
    assert!(request.query_contains("maxResults=10"));
    assert!(request.query_contains("query=CL_*") || request.query_contains("query=CL_%2A"));
}

#[tokio::test]
async fn get_package_merges_metadata_and_contents() {
    let package_xml = r#"<pak:package xmlns:pak="http://www.sap.com/adt/packages"
        xmlns:adtcore="http://www.sap.com/adt/core"
        adtcore:name="$ZMCP_TEST" adtcore:description="Scratch package"/>"#;
    let contents_xml = r#"<asx:abap xmlns:asx="http://www.sap.com/abapxml"><asx:values><DATA><TREE_CONTENT>
        <SEU_ADT_REPOSITORY_OBJ_NODE>
          <OBJECT_TYPE>PROG/P</OBJECT_TYPE>
          <OBJECT_NAME>ZMCP_REPORT</OBJECT_NAME>
          <OBJECT_URI>/sap/bc/adt/programs/programs/zmcp_report</OBJECT_URI>
        </SEU_ADT_REPOSITORY_OBJ_NODE>
        </TREE_CONTENT></DATA></asx:values></asx:abap>"#;
    let exec = ScriptedExec::new(vec![
        ok_xml(package_xml),
        csrf_fetch_ok("token-1"),
        ok_xml(contents_xml),
    ]);
    let client = client_with(exec);

    let package = client.get_package("$zmcp_test").await.unwrap();
    assert_eq!(package.name, "$ZMCP_TEST");
    assert_eq!(package.description.as_deref(), Some("Scratch package"));
    assert!(package.sub_packages.is_empty());
    assert_eq!(package.objects.len(), 1);
    assert_eq!(package.objects[0].name, "ZMCP_REPORT");
}

#[tokio::test]
async fn missing_package_surfaces_as_not_found() {
    let exec = ScriptedExec::new(vec![not_found()]);
    let client = client_with(exec);

    let err = client.get_package("$ZMCP_GONE").await.unwrap_err();
    assert!(matches!(err, AdtError::NotFound(_)));
}

#[tokio::test]
async fn missing_object_read_surfaces_as_not_found() {
    let exec = ScriptedExec::new(vec![not_found()]);
    let client = client_with(exec);

    let err = client
        .read_source(ObjectKind::Program, "ZNOPE", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdtError::NotFound(_)));
}

#[tokio::test]
async fn class_sections_always_contain_main() {
    let exec = ScriptedExec::new(vec![
        ok_text("CLASS zcl_demo DEFINITION PUBLIC. ENDCLASS."),
        ok_text(""),         // definitions: empty, dropped
        ok_text("METHOD x."), // implementations
        not_found(),         // macros: class has none
        ok_text("CLASS ltc DEFINITION FOR TESTING."),
    ]);
    let client = client_with(exec);

    let sections = client.read_class_sections("zcl_demo").await.unwrap();
    assert!(sections.contains_key("main"));
    assert!(sections.contains_key("implementations"));
    assert!(sections.contains_key("testclasses"));
    assert!(!sections.contains_key("definitions"));
    assert!(!sections.contains_key("macros"));
}
