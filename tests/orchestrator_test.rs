//! End-to-end tests: real filesystem notifications through the orchestrator.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fsreact::reaction::ReactionError;
use fsreact::rules::{CommandTemplate, TargetKind};
use fsreact::{
    Container, DispatchHandler, DispatchRecord, Event, Orchestrator, ReactionDispatcher, RuleSet,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

struct Recorder {
    tx: mpsc::UnboundedSender<DispatchRecord>,
}

#[async_trait]
impl DispatchHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, record: DispatchRecord) -> Result<(), ReactionError> {
        let _ = self.tx.send(record);
        Ok(())
    }
}

fn recording(rules: RuleSet) -> (Orchestrator, mpsc::UnboundedReceiver<DispatchRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::builder()
        .rules(rules)
        .workers(1)
        .handler(move |_pool| {
            let handler: Arc<dyn DispatchHandler> = Arc::new(Recorder { tx });
            handler
        })
        .build()
        .unwrap();
    (orchestrator, rx)
}

fn dir_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn next(rx: &mut mpsc::UnboundedReceiver<DispatchRecord>) -> DispatchRecord {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no dispatch within timeout")
        .expect("dispatch channel closed")
}

/// Longer than the rename pairing window.
const QUIET: Duration = Duration::from_millis(500);

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<DispatchRecord>) {
    if let Ok(Some(record)) = tokio::time::timeout(QUIET, rx.recv()).await {
        panic!("unexpected dispatch: {} {}", record.call.on, record.call.path);
    }
}

#[tokio::test]
async fn test_created_file_is_dispatched() {
    let watched = TempDir::new().unwrap();
    let rules = RuleSet::new(vec![Container::new(dir_str(watched.path()), "true")]);
    let (mut orchestrator, mut rx) = recording(rules);

    orchestrator.start().unwrap();
    assert_eq!(orchestrator.running_watchers(), 1);

    std::fs::write(watched.path().join("report.csv"), "a,b\n").unwrap();

    let record = next(&mut rx).await;
    assert_eq!(record.container, 0);
    assert_eq!(record.call.on, Event::FileCreated);
    assert!(record.call.path.ends_with("report.csv"));
    assert_eq!(record.call.args, "");

    orchestrator.stop().await;
    orchestrator.stop().await;
    assert!(orchestrator.is_stopped());
}

#[tokio::test]
async fn test_records_keep_submission_order() {
    let watched = TempDir::new().unwrap();
    let rules = RuleSet::new(vec![Container::new(dir_str(watched.path()), "true")]);
    let (mut orchestrator, mut rx) = recording(rules);
    orchestrator.start().unwrap();

    for name in ["one.txt", "two.txt", "three.txt"] {
        std::fs::write(watched.path().join(name), name).unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let record = next(&mut rx).await;
        let name = Path::new(&record.call.path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        seen.push(name);
    }
    assert_eq!(seen, vec!["one.txt", "two.txt", "three.txt"]);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_failing_watcher_is_isolated() {
    let watched = TempDir::new().unwrap();
    let rules = RuleSet::new(vec![
        Container::new("/definitely/not/here", "true"),
        Container::new(dir_str(watched.path()), "true"),
    ]);
    let (mut orchestrator, mut rx) = recording(rules);

    orchestrator.start().unwrap();
    assert_eq!(orchestrator.running_watchers(), 1);
    assert!(!orchestrator.watchers()[0].is_running());

    std::fs::write(watched.path().join("still-works"), "").unwrap();

    let record = next(&mut rx).await;
    assert_eq!(record.container, 1);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_excluded_extension_is_not_dispatched() {
    let watched = TempDir::new().unwrap();
    let rules = RuleSet::new(vec![
        Container::new(dir_str(watched.path()), "true").exclude_extension("tmp"),
    ]);
    let (mut orchestrator, mut rx) = recording(rules);
    orchestrator.start().unwrap();

    std::fs::write(watched.path().join("partial.tmp"), "").unwrap();
    std::fs::write(watched.path().join("final.txt"), "").unwrap();

    let record = next(&mut rx).await;
    assert!(record.call.path.ends_with("final.txt"));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_file_rename_dispatches_one_move() {
    let watched = TempDir::new().unwrap();
    let old = watched.path().join("draft.txt");
    let new = watched.path().join("final.txt");
    std::fs::write(&old, "body").unwrap();

    let rules = RuleSet::new(vec![
        Container::new(dir_str(watched.path()), "true")
            .with_events([Event::FileMoved, Event::DirMoved]),
    ]);
    let (mut orchestrator, mut rx) = recording(rules);
    orchestrator.start().unwrap();

    std::fs::rename(&old, &new).unwrap();

    let record = next(&mut rx).await;
    assert_eq!(record.call.on, Event::FileMoved);
    assert_eq!(record.call.path, dir_str(&new));
    assert_quiet(&mut rx).await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_directory_rename_dispatches_one_dir_move() {
    let watched = TempDir::new().unwrap();
    let old = watched.path().join("batch-1");
    let new = watched.path().join("batch-2");
    std::fs::create_dir(&old).unwrap();

    let rules = RuleSet::new(vec![
        Container::new(dir_str(watched.path()), "true")
            .with_events([Event::FileMoved, Event::DirMoved]),
    ]);
    let (mut orchestrator, mut rx) = recording(rules);
    orchestrator.start().unwrap();

    std::fs::rename(&old, &new).unwrap();

    let record = next(&mut rx).await;
    assert_eq!(record.call.on, Event::DirMoved);
    assert_eq!(record.call.path, dir_str(&new));
    assert_quiet(&mut rx).await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_file_rule_ignores_directory_rename() {
    let watched = TempDir::new().unwrap();
    let old = watched.path().join("inbox");
    let new = watched.path().join("archive");
    std::fs::create_dir(&old).unwrap();

    let rules = RuleSet::new(vec![
        Container::new(dir_str(watched.path()), "true")
            .with_kind(TargetKind::File)
            .with_events([Event::FileMoved, Event::DirMoved]),
        Container::new(dir_str(watched.path()), "true").with_events([Event::DirMoved]),
    ]);
    let (mut orchestrator, mut rx) = recording(rules);
    orchestrator.start().unwrap();
    assert_eq!(orchestrator.running_watchers(), 2);

    std::fs::rename(&old, &new).unwrap();

    let record = next(&mut rx).await;
    assert_eq!(record.container, 1);
    assert_eq!(record.call.on, Event::DirMoved);
    assert_quiet(&mut rx).await;

    orchestrator.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_receives_positional_arguments() {
    let watched = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let marker = output.path().join("calls.log");

    let script = format!("echo \"$0|$2\" >> '{}'", marker.display());
    let container = Container::new(dir_str(watched.path()), "unused")
        .with_args("from-rule")
        .with_events([Event::FileCreated]);
    let container = Container {
        cmd: CommandTemplate::Argv(vec!["sh".to_string(), "-c".to_string(), script]),
        ..container
    };

    let mut orchestrator = Orchestrator::builder()
        .rules(RuleSet::new(vec![container]))
        .workers(2)
        .handler(|pool| {
            let handler: Arc<dyn DispatchHandler> =
                Arc::new(ReactionDispatcher::new(pool, Duration::from_secs(5)));
            handler
        })
        .build()
        .unwrap();
    orchestrator.start().unwrap();

    std::fs::write(watched.path().join("input.bin"), [0u8; 4]).unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    let content = loop {
        if let Ok(content) = std::fs::read_to_string(&marker) {
            if !content.is_empty() {
                break content;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "command did not run within timeout"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(content.trim(), "fileCreated|from-rule");

    orchestrator.stop().await;
    assert!(orchestrator.pool().executed() >= 1);
}
