//! Syntax checks and ABAP Unit runs.

use crate::adt::catalog::ObjectKind;
use crate::adt::xml::aunit::{
    parse_run_result, run_configuration_body, UnitTestFlags, UnitTestResult,
};
use crate::adt::xml::checks::{parse_syntax_messages, syntax_check_body, CheckMessage};
use crate::adt::AdtClient;
use crate::error::AdtError;

const XML_ACCEPT: &str = "application/xml";

const CHECK_RUN_CONTENT_TYPE: &str = "application/vnd.sap.adt.checkobjects+xml";

const AUNIT_CONTENT_TYPE: &str =
    "application/vnd.sap.adt.abapunit.testruns.config.v4+xml";

impl AdtClient {
    /// Check a candidate source against an object without saving it.
    pub async fn syntax_check(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        source: &str,
    ) -> Result<Vec<CheckMessage>, AdtError> {
        let object_uri = kind.object_uri(name, parent)?;
        let source_uri = kind.source_uri(name, parent, None)?;
        let body = syntax_check_body(&object_uri, &source_uri, source);
        let response = self
            .transport()
            .post(
                "/sap/bc/adt/checkruns",
                &[("reporters", "abapCheckRun")],
                XML_ACCEPT,
                CHECK_RUN_CONTENT_TYPE,
                body.into_bytes(),
            )
            .await?;
        parse_syntax_messages(&response.text())
    }

    /// Run the unit tests attached to an object. An object without test
    /// classes yields an empty result, not an error.
    pub async fn run_unit_tests(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        flags: &UnitTestFlags,
    ) -> Result<UnitTestResult, AdtError> {
        let object_uri = kind.object_uri(name, parent)?;
        let body = run_configuration_body(&object_uri, flags);
        let response = self
            .transport()
            .post(
                "/sap/bc/adt/abapunit/testruns",
                &[],
                XML_ACCEPT,
                AUNIT_CONTENT_TYPE,
                body.into_bytes(),
            )
            .await?;
        parse_run_result(&response.text())
    }
}
