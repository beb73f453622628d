use agent_eval::agent::{AgentResponse, FnAgent};
use agent_eval::engine::run_case;
use agent_eval::telemetry::route_panics_to_tracing;
use agent_eval::types::{Case, CaseStatus};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn agent_panic_is_logged_once_through_tracing() {
    route_panics_to_tracing();

    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let agent = FnAgent::new(|_: &str| -> anyhow::Result<AgentResponse> {
        panic!("tool registry corrupted")
    });
    let result = tracing::subscriber::with_default(subscriber, || {
        run_case(&agent, &Case::new("panics", "hi"))
    });

    assert_eq!(result.status, CaseStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("tool registry corrupted"));

    let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(logged.contains("panic: tool registry corrupted"), "{logged}");
    assert!(logged.contains("tests/telemetry.rs"), "{logged}");
}
