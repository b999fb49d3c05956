use super::*;
use crate::encode::ffmpeg::OutputFormat;
use crate::foundation::core::Canvas;

const WAIT: Duration = Duration::from_secs(60);

struct Fixture {
    repo: tempfile::TempDir,
    out: tempfile::TempDir,
    scratch: tempfile::TempDir,
    bin: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            repo: tempfile::tempdir().unwrap(),
            out: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
            bin: tempfile::tempdir().unwrap(),
        }
    }

    fn with_commits(n: usize) -> Self {
        let fx = Self::new();
        let repo = git2::Repository::init(fx.repo.path()).unwrap();
        let mut parent: Option<git2::Oid> = None;
        for i in 0..n {
            std::fs::write(fx.repo.path().join(format!("file_{i}.txt")), format!("content {i}\n"))
                .unwrap();
            let mut index = repo.index().unwrap();
            index
                .add_path(Path::new(&format!("file_{i}.txt")))
                .unwrap();
            index.write().unwrap();
            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = git2::Signature::new(
                "Ada",
                "ada@example.com",
                &git2::Time::new(1_700_000_000 + i as i64 * 60, 0),
            )
            .unwrap();
            let parents: Vec<git2::Commit<'_>> =
                parent.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            parent = Some(
                repo.commit(Some("HEAD"), &sig, &sig, &format!("commit {i}"), &tree, &parent_refs)
                    .unwrap(),
            );
        }
        fx
    }

    fn config(&self, encoder: impl Into<OsString>) -> OrchestratorConfig {
        OrchestratorConfig {
            output_dir: self.out.path().to_path_buf(),
            scratch_root: self.scratch.path().to_path_buf(),
            encoder_program: encoder.into(),
            retention: None,
        }
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().count() == 0
    }

    #[cfg(unix)]
    fn encoder(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt as _;
        let path = self.bin.path().join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

#[cfg(unix)]
const COPY_MANIFEST: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then manifest="$arg"; fi
  prev="$arg"
  out="$arg"
done
sleep "${FAKE_ENCODER_DELAY:-0}"
cp "$manifest" "$out"
"#;

fn small_options() -> JobOptions {
    JobOptions {
        canvas: Canvas::new(320, 240).unwrap(),
        ..JobOptions::default()
    }
}

#[test]
fn invalid_options_fail_before_any_job_exists() {
    let fx = Fixture::with_commits(1);
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    let odd = JobOptions {
        canvas: Canvas::new(321, 240).unwrap(),
        ..JobOptions::default()
    };
    assert!(matches!(
        orch.submit(fx.repo.path(), odd),
        Err(ChronoError::InvalidOption(_))
    ));
    assert!(orch.list_jobs().is_empty());
    assert!(fx.scratch_is_empty());
}

#[test]
fn unopenable_repository_fails_synchronously() {
    let fx = Fixture::new();
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    let err = orch
        .submit(fx.repo.path().join("missing"), small_options())
        .unwrap_err();
    assert!(matches!(err, ChronoError::Repository(_)));
    assert!(orch.list_jobs().is_empty());
}

#[test]
fn unknown_ids_are_not_found() {
    let fx = Fixture::new();
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    assert!(matches!(orch.query("nope"), Err(ChronoError::NotFound(_))));
    assert!(matches!(
        orch.fetch_result("nope"),
        Err(ChronoError::NotFound(_))
    ));
}

#[test]
fn missing_encoder_fails_the_job_and_leaves_nothing_behind() {
    let fx = Fixture::with_commits(2);
    let orch = JobOrchestrator::new(fx.config("/definitely/not/ffmpeg")).unwrap();
    let id = orch.submit(fx.repo.path(), small_options()).unwrap();

    let view = orch.wait(&id, WAIT).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("encoder unavailable"));
    assert!(view.message.starts_with("Error: "));
    assert!(!view.has_output);
    assert!(fx.scratch_is_empty());
    assert_eq!(std::fs::read_dir(fx.out.path()).unwrap().count(), 0);
    assert!(matches!(
        orch.fetch_result(&id),
        Err(ChronoError::NotFound(_))
    ));
}

#[test]
fn ids_are_unique_and_listed_in_submission_order() {
    let fx = Fixture::with_commits(1);
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    let ids: Vec<JobId> = (0..5)
        .map(|_| orch.submit(fx.repo.path(), small_options()).unwrap())
        .collect();
    let mut dedup = ids.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), ids.len());

    let listed: Vec<JobId> = orch.list_jobs().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, ids);
    for id in &ids {
        orch.wait(id, WAIT).unwrap();
    }
}

#[cfg(unix)]
#[test]
fn empty_history_fails_with_descriptive_error() {
    let fx = Fixture::new();
    git2::Repository::init(fx.repo.path()).unwrap();
    let enc = fx.encoder("ffmpeg", COPY_MANIFEST);
    let orch = JobOrchestrator::new(fx.config(enc)).unwrap();

    let id = orch.submit(fx.repo.path(), small_options()).unwrap();
    let view = orch.wait(&id, WAIT).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(
        view.message,
        "Error: No commits found in the specified branch."
    );
    assert!(fx.scratch_is_empty());
}

#[cfg(unix)]
#[test]
fn successful_job_completes_with_ordered_frames() {
    let fx = Fixture::with_commits(3);
    let enc = fx.encoder("ffmpeg", COPY_MANIFEST);
    let orch = JobOrchestrator::new(fx.config(enc)).unwrap();

    let id = orch.submit(fx.repo.path(), small_options()).unwrap();
    let mut last = 0;
    let deadline = Instant::now() + WAIT;
    let view = loop {
        let view = orch.query(&id).unwrap();
        assert!(view.progress >= last, "progress went backwards");
        last = view.progress;
        if view.status.is_terminal() || Instant::now() > deadline {
            break view;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(view.status, JobStatus::Completed, "{view:?}");
    assert_eq!(view.progress, 100);
    assert_eq!(view.message, "Time-lapse generated successfully!");
    assert!(view.has_output);
    assert!(view.error.is_none());

    let artifact = orch.fetch_result(&id).unwrap();
    assert_eq!(
        artifact.file_name().unwrap().to_string_lossy(),
        format!("timelapse_{id}.mp4")
    );
    let manifest = std::fs::read_to_string(&artifact).unwrap();
    let frames: Vec<String> = manifest
        .lines()
        .map(|l| {
            Path::new(l.trim_start_matches("file '").trim_end_matches('\''))
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(
        frames,
        vec!["frame_00000.png", "frame_00001.png", "frame_00002.png"]
    );
    assert!(fx.scratch_is_empty());

    let after = orch.query(&id).unwrap();
    assert_eq!(after, view);
}

#[cfg(unix)]
#[test]
fn running_job_is_not_ready() {
    let fx = Fixture::with_commits(1);
    let slow = COPY_MANIFEST.replace("${FAKE_ENCODER_DELAY:-0}", "2");
    let enc = fx.encoder("ffmpeg", &slow);
    let orch = JobOrchestrator::new(fx.config(enc)).unwrap();

    let id = orch.submit(fx.repo.path(), small_options()).unwrap();
    assert!(matches!(
        orch.fetch_result(&id),
        Err(ChronoError::NotReady(_))
    ));
    assert_eq!(orch.wait(&id, WAIT).unwrap().status, JobStatus::Completed);
}

#[cfg(unix)]
#[test]
fn prune_removes_expired_artifacts_but_keeps_records() {
    let fx = Fixture::with_commits(1);
    let enc = fx.encoder("ffmpeg", COPY_MANIFEST);
    let mut config = fx.config(enc);
    config.retention = Some(Duration::ZERO);
    let orch = JobOrchestrator::new(config).unwrap();

    let id = orch.submit(fx.repo.path(), small_options()).unwrap();
    assert_eq!(orch.wait(&id, WAIT).unwrap().status, JobStatus::Completed);
    assert!(orch.fetch_result(&id).is_ok());

    assert_eq!(orch.prune_expired(), 1);
    assert_eq!(orch.prune_expired(), 0);
    assert!(matches!(
        orch.fetch_result(&id),
        Err(ChronoError::NotFound(_))
    ));
    let view = orch.query(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert!(!view.has_output);
}

#[test]
fn prune_without_retention_is_a_noop() {
    let fx = Fixture::new();
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    assert_eq!(orch.prune_expired(), 0);
}

#[test]
fn branches_are_listed_synchronously() {
    let fx = Fixture::with_commits(1);
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    let branches = orch.list_branches(fx.repo.path()).unwrap();
    assert_eq!(branches.len(), 1);
    assert!(matches!(
        orch.list_branches(fx.repo.path().join("nope")),
        Err(ChronoError::Repository(_))
    ));
}

#[test]
fn preview_returns_png_for_newest_commit() {
    let fx = Fixture::with_commits(2);
    let orch = JobOrchestrator::new(fx.config("/no/encoder")).unwrap();
    let preview = orch.preview(fx.repo.path(), &small_options()).unwrap();
    assert_eq!(preview.commit.message, "commit 1");
    assert_eq!(&preview.png[..8], b"\x89PNG\r\n\x1a\n");
    let img = image::load_from_memory(&preview.png).unwrap();
    assert_eq!((img.width(), img.height()), (320, 240));
}

#[cfg(unix)]
#[test]
fn encoder_failure_removes_partial_output() {
    const WRITE_THEN_FAIL: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then exit 0; fi
for arg in "$@"; do out="$arg"; done
echo "partial" > "$out"
echo "muxer crashed" >&2
exit 1
"#;
    let fx = Fixture::with_commits(2);
    let encoder = fx.encoder("ffmpeg", WRITE_THEN_FAIL);
    let orch = JobOrchestrator::new(fx.config(encoder)).unwrap();

    let id = orch.submit(fx.repo.path(), small_options()).unwrap();
    let view = orch.wait(&id, WAIT).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("muxer crashed"));
    assert_eq!(std::fs::read_dir(fx.out.path()).unwrap().count(), 0);
    assert!(fx.scratch_is_empty());
}
