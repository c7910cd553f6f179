//! CSRF token lifecycle against a scripted backend.

mod support;

use mcp_abap_adt::error::AdtError;
use support::*;

#[tokio::test]
async fn stale_token_is_refreshed_and_the_mutation_retried_once() {
    // Fetch -> POST rejected -> fresh fetch -> POST succeeds.
    let exec = ScriptedExec::new(vec![
        csrf_fetch_ok("token-1"),
        csrf_rejected(),
        csrf_fetch_ok("token-2"),
        ok_text("REPORT zmcp_demo.\nWRITE 'hi'."),
    ]);
    let client = client_with(exec.clone());

    let formatted = client.pretty_print("REPORT zmcp_demo. WRITE 'hi'.").await.unwrap();
    assert!(formatted.contains("REPORT"));

    let requests = exec.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].path, "/sap/bc/adt/discovery");
    assert_eq!(requests[0].csrf_header.as_deref(), Some("Fetch"));
    assert_eq!(requests[1].path, "/sap/bc/adt/abapsource/prettyprinter");
    assert_eq!(requests[1].csrf_header.as_deref(), Some("token-1"));
    assert_eq!(requests[2].path, "/sap/bc/adt/discovery");
    assert_eq!(requests[3].path, "/sap/bc/adt/abapsource/prettyprinter");
    assert_eq!(requests[3].csrf_header.as_deref(), Some("token-2"));

    // Exactly two round trips for the mutation itself.
    let mutations = requests
        .iter()
        .filter(|r| r.path == "/sap/bc/adt/abapsource/prettyprinter")
        .count();
    assert_eq!(mutations, 2);
}

#[tokio::test]
async fn refresh_happens_at_most_once_per_originating_request() {
    // The retried mutation is rejected again: no further retry, the error
    // surfaces, and exactly four round trips happened.
    let exec = ScriptedExec::new(vec![
        csrf_fetch_ok("token-1"),
        csrf_rejected(),
        csrf_fetch_ok("token-2"),
        csrf_rejected(),
    ]);
    let client = client_with(exec.clone());

    let err = client.pretty_print("REPORT z.").await.unwrap_err();
    assert!(matches!(err, AdtError::Authentication { status: 403 }));
    assert_eq!(exec.request_count(), 4);
}

#[tokio::test]
async fn token_is_reused_across_mutations() {
    let exec = ScriptedExec::new(vec![
        csrf_fetch_ok("token-1"),
        ok_text("a"),
        ok_text("b"),
    ]);
    let client = client_with(exec.clone());

    client.pretty_print("x").await.unwrap();
    client.pretty_print("y").await.unwrap();

    let requests = exec.requests();
    assert_eq!(requests.len(), 3, "second mutation must not re-fetch");
    assert_eq!(requests[2].csrf_header.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn plain_reads_do_not_fetch_a_token() {
    let exec = ScriptedExec::new(vec![ok_text("REPORT zmcp_demo.")]);
    let client = client_with(exec.clone());

    let source = client
        .read_source(
            mcp_abap_adt::adt::ObjectKind::Program,
            "ZMCP_DEMO",
            None,
            None,
        )
        .await
        .unwrap();
    assert!(source.contains("REPORT"));

    let requests = exec.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    // Unknown token travels as the Fetch sentinel on reads.
    assert_eq!(requests[0].csrf_header.as_deref(), Some("Fetch"));
}

#[tokio::test]
async fn discovery_auth_failure_surfaces_as_authentication_error() {
    let exec = ScriptedExec::new(vec![response(401, &[], "")]);
    let client = client_with(exec.clone());

    let err = client.pretty_print("x").await.unwrap_err();
    assert!(matches!(err, AdtError::Authentication { status: 401 }));
}
