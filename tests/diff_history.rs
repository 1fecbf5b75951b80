use std::sync::Arc;

use sqlvc::{
    Author, ExecutionOutcome, ExecutorFailure, MemoryStateStore, SqlExecutor, SqlvcConfig,
    SqlvcErrorCode, SqlvcInstance,
};

struct NoopExecutor;

#[async_trait::async_trait]
impl SqlExecutor for NoopExecutor {
    async fn execute(
        &self,
        _connection_id: &str,
        _statement: &str,
    ) -> Result<ExecutionOutcome, ExecutorFailure> {
        Ok(ExecutionOutcome::default())
    }
}

fn instance() -> SqlvcInstance {
    SqlvcInstance::new(
        SqlvcConfig::default(),
        Arc::new(MemoryStateStore::new()),
        Arc::new(NoopExecutor),
    )
    .expect("instance")
}

fn author() -> Author {
    Author {
        name: "dev".into(),
        email: "dev@example.com".into(),
        user_id: "u1".into(),
    }
}

async fn commit_table(vc: &SqlvcInstance, table: &str, message: &str) -> sqlvc::Commit {
    vc.track("conn-1", &format!("CREATE TABLE {table} (id INT)"), None, None)
        .await
        .expect("track");
    vc.commit("conn-1", message, author(), None, None)
        .await
        .expect("commit")
}

#[tokio::test]
async fn revision_zero_is_head_and_negatives_walk_back() {
    let vc = instance();
    let first = commit_table(&vc, "a", "one").await;
    let second = commit_table(&vc, "b", "two").await;

    let head = vc.resolve_revision("conn-1", 0).await.expect("head");
    assert_eq!(head.id, second.id);
    let back = vc.resolve_revision("conn-1", -1).await.expect("back one");
    assert_eq!(back.id, first.id);

    let err = vc
        .resolve_revision("conn-1", -2)
        .await
        .expect_err("past the root");
    assert_eq!(err.code(), SqlvcErrorCode::RevisionNotFound);
    let err = vc
        .resolve_revision("conn-1", 1)
        .await
        .expect_err("positive revisions are invalid");
    assert_eq!(err.code(), SqlvcErrorCode::RevisionNotFound);
}

#[tokio::test]
async fn diff_requires_two_commits() {
    let vc = instance();
    commit_table(&vc, "a", "one").await;
    let err = vc.diff("conn-1", -1, 0).await.expect_err("one commit");
    assert_eq!(err.code(), SqlvcErrorCode::InsufficientHistory);
}

#[tokio::test]
async fn diff_reports_changes_made_between_revisions() {
    let vc = instance();
    commit_table(&vc, "a", "one").await;
    commit_table(&vc, "b", "two").await;
    commit_table(&vc, "c", "three").await;

    let report = vc.diff("conn-1", -2, 0).await.expect("diff");
    assert_eq!(report.from.revision, -2);
    assert_eq!(report.from.commit.message, "one");
    assert_eq!(report.to.commit.message, "three");
    assert!(report.to.changes.is_empty(), "nothing is newer than head");

    let targets: Vec<&str> = report
        .from
        .changes
        .iter()
        .map(|c| c.target.as_str())
        .collect();
    assert_eq!(targets, vec!["c", "b"], "newest first, target excluded");
}

#[tokio::test]
async fn diff_follows_the_checked_out_branch() {
    let vc = instance();
    commit_table(&vc, "a", "base").await;
    vc.create_branch("conn-1", "feature").await.expect("create");
    vc.checkout("conn-1", "feature").await.expect("checkout");
    commit_table(&vc, "b", "feature work").await;

    let report = vc.diff("conn-1", -1, 0).await.expect("diff on feature");
    assert_eq!(report.from.commit.message, "base");
    assert_eq!(report.to.commit.message, "feature work");

    vc.checkout("conn-1", "main").await.expect("checkout main");
    let err = vc
        .diff("conn-1", -1, 0)
        .await
        .expect_err("main still has a single commit");
    assert_eq!(err.code(), SqlvcErrorCode::InsufficientHistory);
}
