// tests/log_ordering.rs

mod common;
use crate::common::init_tracing;

use std::io::Cursor;
use std::sync::Arc;

use proptest::prelude::*;
use tokio::sync::watch;

use procherd::config::SupervisorSettings;
use procherd::events::{event_channel, SupervisorEvent};
use procherd::multiplex::{spawn_reader, LineClassifier};
use procherd::registry::ServiceDescriptor;
use procherd::types::OutputStream;

/// One line written by a child: either a structured record or free-form noise.
#[derive(Debug, Clone)]
enum Written {
    Structured(String),
    Noise(String),
}

fn written_strategy() -> impl Strategy<Value = Written> {
    prop_oneof![
        "[a-zA-Z0-9 .,:!?-]{0,40}".prop_map(Written::Structured),
        "[a-zA-Z0-9 ]{0,40}".prop_map(Written::Noise),
    ]
}

fn render(lines: &[Written]) -> Vec<u8> {
    let mut out = String::new();
    for line in lines {
        match line {
            Written::Structured(message) => {
                out.push_str("LOG::");
                out.push_str(&serde_json::json!({ "message": message }).to_string());
            }
            // No sentinel and no allow-list on this service: always dropped.
            Written::Noise(text) => out.push_str(text),
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn delivered_messages(input: Vec<u8>) -> Vec<String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    rt.block_on(async move {
        let descriptor = ServiceDescriptor::new("Auth", ["true"]);
        let classifier = Arc::new(LineClassifier::new(&descriptor, &SupervisorSettings::default()));
        // Small buffer: the reader has to wait for the consumer repeatedly.
        let (tx, mut rx) = event_channel(2);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let reader = spawn_reader(Cursor::new(input), OutputStream::Stdout, classifier, tx, stop_rx);

        let mut messages = Vec::new();
        while let Some(event) = rx.recv().await {
            if let SupervisorEvent::LogReceived(log) = event {
                messages.push(log.message);
            }
        }
        reader.await.expect("reader task");
        messages
    })
}

proptest! {
    #[test]
    fn events_from_one_channel_keep_write_order(lines in proptest::collection::vec(written_strategy(), 0..60)) {
        let expected: Vec<String> = lines
            .iter()
            .filter_map(|l| match l {
                Written::Structured(m) => Some(m.clone()),
                Written::Noise(_) => None,
            })
            .collect();

        let delivered = delivered_messages(render(&lines));
        prop_assert_eq!(delivered, expected);
    }
}

/// Per-channel order holds end-to-end through a real child process writing
/// to both stdout and stderr.
#[cfg(unix)]
#[tokio::test]
async fn real_process_output_keeps_per_channel_order() -> Result<(), Box<dyn std::error::Error>> {
    use crate::common::{fast_settings, sh_service, supervisor_with, RecordingShutdown};
    use std::time::Duration;

    init_tracing();
    let script = r#"i=0
while [ $i -lt 200 ]; do
  echo "LOG::{\"message\":\"out $i\"}"
  echo "LOG::{\"message\":\"err $i\"}" >&2
  i=$((i+1))
done
exec sleep 30"#;

    let (supervisor, events) = supervisor_with(
        vec![sh_service("Counter", script)],
        fast_settings(),
        Arc::new(RecordingShutdown::refusing()),
    );

    supervisor.start("Counter").await?;
    assert!(events.wait_for_logs("Counter", 400, Duration::from_secs(10)).await);

    let logs = events.logs_of("Counter");
    let stdout: Vec<_> = logs
        .iter()
        .filter(|l| l.source == OutputStream::Stdout)
        .map(|l| l.message.clone())
        .collect();
    let stderr: Vec<_> = logs
        .iter()
        .filter(|l| l.source == OutputStream::Stderr)
        .map(|l| l.message.clone())
        .collect();

    assert_eq!(stdout, (0..200).map(|i| format!("out {i}")).collect::<Vec<_>>());
    assert_eq!(stderr, (0..200).map(|i| format!("err {i}")).collect::<Vec<_>>());

    supervisor.shutdown_all().await;
    Ok(())
}
