//! ABAP Unit run configuration and `runResult` decoding.

use rmcp::schemars::{self, JsonSchema};

use crate::adt::xml::{Element, XmlBuilder};
use crate::error::AdtError;

/// Risk levels a run may admit.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, JsonSchema)]
pub struct RiskLevels {
    pub harmless: bool,
    pub dangerous: bool,
    pub critical: bool,
}

/// Duration categories a run may admit.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, JsonSchema)]
pub struct Durations {
    pub short: bool,
    pub medium: bool,
    pub long: bool,
}

/// Unit-test run configuration.
#[derive(Debug, Clone, Copy)]
pub struct UnitTestFlags {
    pub risk_levels: RiskLevels,
    pub durations: Durations,
    pub coverage: bool,
}

impl Default for UnitTestFlags {
    /// Harmless tests of short and medium duration, no coverage.
    fn default() -> Self {
        UnitTestFlags {
            risk_levels: RiskLevels {
                harmless: true,
                dangerous: false,
                critical: false,
            },
            durations: Durations {
                short: true,
                medium: true,
                long: false,
            },
            coverage: false,
        }
    }
}

/// Build the run configuration for one object set.
pub fn run_configuration_body(object_uri: &str, flags: &UnitTestFlags) -> String {
    let coverage = bool_str(flags.coverage);
    XmlBuilder::new()
        .start(
            "aunit:runConfiguration",
            &[("xmlns:aunit", "http://www.sap.com/adt/aunit")],
        )
        .start("external", &[])
        .empty("coverage", &[("active", coverage)])
        .end()
        .start("options", &[])
        .empty("uriType", &[("value", "semantic")])
        .empty(
            "testDeterminationStrategy",
            &[("sameProgram", "true"), ("assignedTests", "false")],
        )
        .empty(
            "testRiskLevels",
            &[
                ("harmless", bool_str(flags.risk_levels.harmless)),
                ("dangerous", bool_str(flags.risk_levels.dangerous)),
                ("critical", bool_str(flags.risk_levels.critical)),
            ],
        )
        .empty(
            "testDurations",
            &[
                ("short", bool_str(flags.durations.short)),
                ("medium", bool_str(flags.durations.medium)),
                ("long", bool_str(flags.durations.long)),
            ],
        )
        .end()
        .start(
            "adtcore:objectSets",
            &[("xmlns:adtcore", crate::adt::catalog::ObjectKind::adtcore_ns())],
        )
        .start("objectSet", &[("kind", "inclusive")])
        .start("adtcore:objectReferences", &[])
        .empty("adtcore:objectReference", &[("adtcore:uri", object_uri)])
        .end()
        .end()
        .end()
        .end()
        .finish()
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

/// A failed assertion or runtime alert attached to a test method.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestAlert {
    pub kind: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// One executed test method.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestMethod {
    pub name: String,
    /// Execution time in the unit the server reported (microseconds).
    pub execution_time: Option<f64>,
    pub alerts: Vec<TestAlert>,
}

/// One executed test class.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestClass {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_category: Option<String>,
    pub methods: Vec<TestMethod>,
}

/// Decoded `runResult` envelope.
#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct UnitTestResult {
    pub classes: Vec<TestClass>,
}

impl UnitTestResult {
    pub fn total_methods(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    pub fn failed_methods(&self) -> usize {
        self.classes
            .iter()
            .flat_map(|c| &c.methods)
            .filter(|m| !m.alerts.is_empty())
            .count()
    }
}

/// Decode a `runResult` envelope.
///
/// The root element is `runResult` itself — it is not wrapped further. An
/// empty body means the object carries no test classes at all and decodes to
/// an empty result, not an error.
pub fn parse_run_result(body: &str) -> Result<UnitTestResult, AdtError> {
    if body.trim().is_empty() {
        return Ok(UnitTestResult::default());
    }
    let root = Element::parse(body)?;
    if root.name != "runResult" {
        return Err(AdtError::Protocol(format!(
            "expected runResult envelope, found <{}>",
            root.name
        )));
    }

    let mut class_elements = Vec::new();
    root.descendants("testClass", &mut class_elements);

    let classes = class_elements
        .into_iter()
        .map(|class| {
            let methods = {
                let mut method_elements = Vec::new();
                class.descendants("testMethod", &mut method_elements);
                method_elements
                    .into_iter()
                    .map(parse_method)
                    .collect::<Result<Vec<_>, _>>()?
            };
            Ok(TestClass {
                name: class.require_attr("name")?.to_string(),
                risk_level: class.attr("riskLevel").map(str::to_string),
                duration_category: class.attr("durationCategory").map(str::to_string),
                methods,
            })
        })
        .collect::<Result<Vec<_>, AdtError>>()?;

    Ok(UnitTestResult { classes })
}

fn parse_method(method: &Element) -> Result<TestMethod, AdtError> {
    let mut alert_elements = Vec::new();
    method.descendants("alert", &mut alert_elements);
    let alerts = alert_elements
        .into_iter()
        .map(|alert| TestAlert {
            kind: alert.attr("kind").unwrap_or("").to_string(),
            severity: alert.attr("severity").unwrap_or("").to_string(),
            title: alert.child_text("title").map(str::to_string),
            details: alert
                .child("details")
                .map(|details| {
                    details
                        .children_named("detail")
                        .filter_map(|d| d.attr("text").map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();
    Ok(TestMethod {
        name: method.require_attr("name")?.to_string(),
        execution_time: method.attr("executionTime").and_then(|t| t.parse().ok()),
        alerts,
    })
}
