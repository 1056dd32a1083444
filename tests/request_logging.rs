mod common;

use common::spawn_app;
use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use std::sync::{Mutex, Once};
use std::time::Duration;

lazy_static! {
    static ref RECORDS: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
}

static INIT: Once = Once::new();
static LOGGER: CaptureLogger = CaptureLogger;

/// Keeps every `log` record as `(target, message)`
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn capture_logs() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("Logger already installed");
        log::set_max_level(LevelFilter::Trace);
    });
}

fn records() -> Vec<(String, String)> {
    RECORDS.lock().unwrap().clone()
}

#[tokio::test]
async fn access_log_records_path_without_query_string() {
    capture_logs();
    let app = spawn_app();

    app.register("alice", "a@x.com").await;
    let token = app.wait_for_token("a@x.com", 1).await;
    assert_eq!(200, app.verify_email(&token).await.status().as_u16());

    // The access log line is written once the response body is done
    let mut access_line = None;
    for _ in 0..100 {
        access_line = records().into_iter().find(|(target, message)| {
            target.starts_with("actix_web::middleware::logger")
                && message.contains("/auth/verify-email")
        });
        if access_line.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (_, line) = access_line.expect("no access log line for /auth/verify-email");
    assert!(line.contains(" 200 "), "unexpected access log line: {}", line);

    for (target, message) in records() {
        if target.starts_with("actix") || target.starts_with("todo_auth") {
            assert!(
                !message.contains(&token),
                "{} logged the verification token: {}",
                target,
                message
            );
            assert!(!message.contains("token="), "{} logged a query string: {}", target, message);
        }
    }
}
