// Prometheus counters exposed at /metrics

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref UPLOADS: IntCounterVec = register_counter_vec(
        "gradebox_uploads_total",
        "Accepted submissions by dispatch mode",
        &["mode"],
    );
    pub static ref UPLOAD_FAILURES: IntCounter = register_counter(
        "gradebox_upload_failures_total",
        "Uploads rejected or failed after authentication",
    );
    pub static ref REPORTS_STORED: IntCounter = register_counter(
        "gradebox_reports_stored_total",
        "Result messages written to the store",
    );
    pub static ref REPORTS_DISCARDED: IntCounter = register_counter(
        "gradebox_reports_discarded_total",
        "Result messages dropped as malformed or unstorable",
    );
    pub static ref REPORTS_OVERWRITTEN: IntCounter = register_counter(
        "gradebox_reports_overwritten_total",
        "Results replaced by a redelivery for the same submission",
    );
    pub static ref POLLS: IntCounterVec = register_counter_vec(
        "gradebox_report_polls_total",
        "Report requests by outcome",
        &["outcome"],
    );
    pub static ref LOGINS: IntCounterVec = register_counter_vec(
        "gradebox_logins_total",
        "Interactive login callbacks by outcome",
        &["outcome"],
    );
    pub static ref RESULTS_UNRENDERABLE: IntCounter = register_counter(
        "gradebox_results_unrenderable_total",
        "Locally graded results that are not a JSON object",
    );
    pub static ref AUDIT_FAILURES: IntCounter = register_counter(
        "gradebox_audit_failures_total",
        "Submissions that could not be mirrored",
    );
}

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap_or_else(|e| panic!("counter {}: {}", name, e));
    // registration only fails on duplicate names, which are fixed above
    let _ = REGISTRY.register(Box::new(counter.clone()));
    counter
}

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("counter {}: {}", name, e));
    let _ = REGISTRY.register(Box::new(counter.clone()));
    counter
}

/// Register every counter, so a scrape lists them before first use.
pub fn init() {
    lazy_static::initialize(&UPLOADS);
    lazy_static::initialize(&UPLOAD_FAILURES);
    lazy_static::initialize(&REPORTS_STORED);
    lazy_static::initialize(&REPORTS_DISCARDED);
    lazy_static::initialize(&REPORTS_OVERWRITTEN);
    lazy_static::initialize(&POLLS);
    lazy_static::initialize(&LOGINS);
    lazy_static::initialize(&RESULTS_UNRENDERABLE);
    lazy_static::initialize(&AUDIT_FAILURES);
}

/// Render every registered metric in the text exposition format.
pub fn encode() -> Result<String, prometheus::Error> {
    init();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
