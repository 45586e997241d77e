//! End-to-end scenarios over real files, an in-memory session, and the full
//! decision stack. Each read simulates host persistence by appending the
//! resulting metadata record to the session, the way the agent flushes tool
//! results after a turn.

use readcache_core::decision::{DecisionEngine, ReadContext, ReadOutcome, ReadRequest};
use readcache_core::meta::ReadMode;
use readcache_core::runtime::CacheRuntime;
use readcache_core::session::MemorySession;
use readcache_core::store::{ObjectStore, STORE_DIR};
use readcache_core::ReadCacheConfig;
use readcache_tools::baseline::FsBaselineReader;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    _tmp: TempDir,
    repo: PathBuf,
    engine: DecisionEngine,
    session: MemorySession,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().to_path_buf();
        let config = ReadCacheConfig::default();
        let engine = DecisionEngine::new(
            config.clone(),
            Arc::new(ObjectStore::for_repo(&repo)),
            Arc::new(CacheRuntime::new()),
            Arc::new(FsBaselineReader::new(&config)),
        );
        Self {
            _tmp: tmp,
            repo,
            engine,
            session: MemorySession::with_id("scenario-session"),
        }
    }

    /// Fresh engine over the same repository, as after a process restart
    fn restarted(&self, session: MemorySession) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = ReadCacheConfig::default();
        let engine = DecisionEngine::new(
            config.clone(),
            Arc::new(ObjectStore::for_repo(&self.repo)),
            Arc::new(CacheRuntime::new()),
            Arc::new(FsBaselineReader::new(&config)),
        );
        Self {
            _tmp: tmp,
            repo: self.repo.clone(),
            engine,
            session,
        }
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.repo.join(name), content).unwrap();
    }

    async fn read_request(&self, request: ReadRequest, persist: bool) -> ReadOutcome {
        let ctx = ReadContext {
            session: &self.session,
            cwd: &self.repo,
            cancel: CancellationToken::new(),
        };
        let outcome = self.engine.read(&ctx, &request).await.unwrap();
        if persist {
            if let Some(meta) = &outcome.meta {
                self.session
                    .append_tool_result("read", serde_json::json!({ "readcache": meta.to_value() }));
            }
        }
        outcome
    }

    async fn read(&self, path: &str) -> ReadOutcome {
        self.read_request(
            ReadRequest {
                path: path.to_string(),
                ..Default::default()
            },
            true,
        )
        .await
    }

    async fn read_unpersisted(&self, path: &str) -> ReadOutcome {
        self.read_request(
            ReadRequest {
                path: path.to_string(),
                ..Default::default()
            },
            false,
        )
        .await
    }

    async fn refresh(&self, path: &str) {
        readcache_tools::invalidate(&self.engine, &self.session, &self.repo, path, None, None)
            .await
            .unwrap();
    }
}

fn lines(n: usize, render: impl Fn(usize) -> String) -> String {
    (1..=n).map(|i| render(i) + "\n").collect()
}

#[tokio::test]
async fn s1_unchanged_full() {
    let h = Harness::new();
    h.write("a.txt", "alpha\nbeta\ngamma");

    let first = h.read("a.txt").await;
    assert_eq!(first.mode(), Some(ReadMode::Full));
    let text = first.text();
    assert!(text.contains("alpha"));
    assert!(text.contains("gamma"));

    let second = h.read("a.txt").await;
    assert_eq!(second.mode(), Some(ReadMode::Unchanged));
    assert_eq!(second.text(), "[readcache: unchanged, 3 lines]");
}

#[tokio::test]
async fn s2_diff_emission() {
    let h = Harness::new();
    let original = lines(300, |i| format!("line {i} :: original text payload"));
    h.write("b.txt", &original);

    let first = h.read("b.txt").await;
    assert_eq!(first.mode(), Some(ReadMode::Full));

    let mutated = original.replace(
        "line 200 :: original text payload",
        "line 200 :: changed text payload",
    );
    h.write("b.txt", &mutated);

    let second = h.read("b.txt").await;
    assert_eq!(second.mode(), Some(ReadMode::Diff));
    let text = second.text();
    assert!(
        text.starts_with("[readcache: 1 lines changed of 300]"),
        "unexpected prefix: {}",
        text.lines().next().unwrap_or_default()
    );
    assert!(text.contains("-line 200 :: original text payload"));
    assert!(text.contains("+line 200 :: changed text payload"));
}

#[tokio::test]
async fn s3_range_outside_edit() {
    let h = Harness::new();
    let original = lines(400, |i| format!("line {i}"));
    h.write("c.txt", &original);

    let anchor = h.read("c.txt").await;
    assert_eq!(anchor.mode(), Some(ReadMode::Full));

    let range = h.read("c.txt:160-249").await;
    assert_eq!(range.mode(), Some(ReadMode::UnchangedRange));
    assert_eq!(
        range.text(),
        "[readcache: unchanged in lines 160-249 of 400]"
    );

    let mutated = original.replace("line 300\n", "line 300 updated\n");
    h.write("c.txt", &mutated);

    let outside = h.read("c.txt:160-249").await;
    assert_eq!(outside.mode(), Some(ReadMode::UnchangedRange));
    assert!(outside.text().contains("changes exist outside this range"));

    let covering = h.read("c.txt:100-349").await;
    assert_eq!(covering.mode(), Some(ReadMode::BaselineFallback));
    assert!(covering.text().contains("line 300 updated"));
}

#[tokio::test]
async fn s4_range_shift() {
    let h = Harness::new();
    let original = lines(200, |i| format!("line {i}"));
    h.write("d.txt", &original);

    let anchor = h.read("d.txt").await;
    assert_eq!(anchor.mode(), Some(ReadMode::Full));

    h.write("d.txt", &format!("inserted header line\n{original}"));

    let shifted = h.read("d.txt:100-120").await;
    assert_eq!(shifted.mode(), Some(ReadMode::BaselineFallback));
    assert!(shifted.text().contains("line 99"));
}

#[tokio::test]
async fn s5_strict_compaction_barrier() {
    let h = Harness::new();
    h.write("e.txt", "one\ntwo");

    assert_eq!(h.read("e.txt").await.mode(), Some(ReadMode::Full));
    assert_eq!(h.read("e.txt").await.mode(), Some(ReadMode::Unchanged));

    h.session.append_compaction(None);
    h.engine
        .on_session_event(readcache_core::SessionEvent::Compact);

    let after = h.read("e.txt").await;
    assert!(
        matches!(
            after.mode(),
            Some(ReadMode::Full) | Some(ReadMode::BaselineFallback)
        ),
        "pre-compaction trust must not survive the barrier, got {:?}",
        after.mode()
    );

    // trust rebuilds from the post-compaction anchor
    assert_eq!(h.read("e.txt").await.mode(), Some(ReadMode::Unchanged));
}

#[tokio::test]
async fn s6_refresh_durability() {
    let h = Harness::new();
    h.write("f.txt", "body line 1\nbody line 2");

    assert_eq!(h.read("f.txt").await.mode(), Some(ReadMode::Full));
    assert_eq!(h.read("f.txt").await.mode(), Some(ReadMode::Unchanged));

    h.refresh("f.txt").await;

    // the post-refresh read serves full content; its result stays in the
    // unflushed turn and is lost with the process
    let refreshed = h.read_unpersisted("f.txt").await;
    assert_eq!(refreshed.mode(), Some(ReadMode::Full));

    // persist and reopen from disk
    let path = h.repo.join("session.jsonl");
    h.session.save_to(&path).await.unwrap();
    let resumed_session = MemorySession::load_from("scenario-session", &path)
        .await
        .unwrap();
    let resumed = h.restarted(resumed_session);

    // the invalidation replayed: full again, then unchanged
    assert_eq!(resumed.read("f.txt").await.mode(), Some(ReadMode::Full));
    assert_eq!(
        resumed.read("f.txt").await.mode(),
        Some(ReadMode::Unchanged)
    );
}

#[tokio::test]
async fn s7_missing_base_object() {
    let h = Harness::new();
    h.write("g.txt", "original body");

    let first = h.read("g.txt").await;
    assert_eq!(first.mode(), Some(ReadMode::Full));
    let served_hash = first.meta.as_ref().unwrap().served_hash.clone();

    // delete the stored blob
    let blob = h
        .repo
        .join(STORE_DIR)
        .join("objects")
        .join(format!("sha256-{served_hash}.txt"));
    std::fs::remove_file(&blob).unwrap();

    h.write("g.txt", "mutated body");

    let fallback = h.read("g.txt").await;
    assert_eq!(fallback.mode(), Some(ReadMode::BaselineFallback));
    assert!(fallback.text().contains("mutated body"));
}

#[tokio::test]
async fn bypass_serves_full_content() {
    let h = Harness::new();
    h.write("a.txt", "alpha\nbeta");

    assert_eq!(h.read("a.txt").await.mode(), Some(ReadMode::Full));

    let bypassed = h
        .read_request(
            ReadRequest {
                path: "a.txt".to_string(),
                bypass: true,
                ..Default::default()
            },
            true,
        )
        .await;
    assert_eq!(bypassed.mode(), Some(ReadMode::Full));
    assert!(bypassed.text().contains("alpha"));
}

#[tokio::test]
async fn sensitive_files_carry_no_cache_metadata() {
    let h = Harness::new();
    h.write(".env", "SECRET=1");

    let outcome = h.read(".env").await;
    assert!(outcome.meta.is_none());
    assert!(outcome.text().contains("SECRET=1"));

    // a second read is still plain full content
    let again = h.read(".env").await;
    assert!(again.meta.is_none());
}

#[tokio::test]
async fn cancellation_aborts_before_any_effect() {
    let h = Harness::new();
    h.write("a.txt", "alpha");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = ReadContext {
        session: &h.session,
        cwd: &h.repo,
        cancel,
    };
    let err = h
        .engine
        .read(
            &ctx,
            &ReadRequest {
                path: "a.txt".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, readcache_core::CacheError::Aborted));
}

#[tokio::test]
async fn unchanged_markers_round_trip_within_one_turn() {
    // overlay freshness: the second read of an unflushed turn already sees
    // the first read's trust
    let h = Harness::new();
    h.write("a.txt", "alpha\nbeta\ngamma");

    let first = h.read_unpersisted("a.txt").await;
    assert_eq!(first.mode(), Some(ReadMode::Full));

    let second = h.read_unpersisted("a.txt").await;
    assert_eq!(second.mode(), Some(ReadMode::Unchanged));
    assert_eq!(second.text(), "[readcache: unchanged, 3 lines]");
}

#[tokio::test]
async fn persisted_objects_are_deduplicated() {
    let h = Harness::new();
    h.write("a.txt", "stable body");

    h.read("a.txt").await;
    h.read("a.txt").await;
    h.read("a.txt").await;

    let objects_dir = h.repo.join(STORE_DIR).join("objects");
    let count = std::fs::read_dir(objects_dir).unwrap().count();
    assert_eq!(count, 1, "repeated reads of identical content store one blob");
}

#[tokio::test]
async fn sibling_branch_does_not_inherit_trust() {
    let h = Harness::new();
    h.write("a.txt", "alpha");

    let fork_point = h.session.append_other();
    assert_eq!(h.read("a.txt").await.mode(), Some(ReadMode::Full));
    assert_eq!(h.read("a.txt").await.mode(), Some(ReadMode::Unchanged));

    // grow a sibling branch from the fork point
    h.session.switch_leaf(&fork_point).unwrap();
    h.engine
        .on_session_event(readcache_core::SessionEvent::Switch);

    let sibling = h.read("a.txt").await;
    assert_eq!(
        sibling.mode(),
        Some(ReadMode::Full),
        "trust from the other branch must not leak"
    );
}

#[tokio::test]
async fn refreshed_range_needs_a_fresh_range_anchor() {
    let h = Harness::new();
    let body = lines(50, |i| format!("line {i}"));
    h.write("a.txt", &body);

    assert_eq!(h.read("a.txt").await.mode(), Some(ReadMode::Full));
    assert_eq!(
        h.read("a.txt:10-20").await.mode(),
        Some(ReadMode::UnchangedRange)
    );

    // refresh just the range
    readcache_tools::invalidate(&h.engine, &h.session, &h.repo, "a.txt:10-20", None, None)
        .await
        .unwrap();

    // the full slot still answers full reads, but the refreshed range must
    // re-anchor with full content first
    let range = h.read("a.txt:10-20").await;
    assert_eq!(range.mode(), Some(ReadMode::Full));
    assert!(range.text().contains("line 10"));

    assert_eq!(
        h.read("a.txt:10-20").await.mode(),
        Some(ReadMode::UnchangedRange)
    );
}
