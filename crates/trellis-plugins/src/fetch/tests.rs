//! Unit tests for source fetching.

use std::fs;
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn workspace() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

/// Creates a repository at `root` with one committed file.
fn init_repository(root: &Path) {
    let repo = git2::Repository::init(root).expect("init repository");
    fs::write(root.join("plugin.json"), r#"{"service": "weather.Service"}"#)
        .expect("write manifest");

    let mut index = repo.index().expect("index");
    index
        .add_path(Path::new("plugin.json"))
        .expect("stage manifest");
    index.write().expect("write index");
    let tree_id = index.write_tree().expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");
    let signature = git2::Signature::now("Test User", "test@example.com").expect("signature");
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        "Initial commit",
        &tree,
        &[],
    )
    .expect("commit");
}

/// Fetcher that writes a file and then fails, simulating a broken transfer.
struct PartialFetcher;

impl SourceFetcher for PartialFetcher {
    fn retrieve(&self, source_url: &str, local: &Path) -> Result<(), FetchError> {
        fs::create_dir_all(local).expect("create checkout");
        fs::write(local.join("partial"), "x").expect("write partial file");
        Err(FetchError::SourceUnreachable {
            source_url: source_url.to_owned(),
            message: String::from("connection reset"),
        })
    }
}

#[rstest]
fn git_fetch_clones_into_identity_directory(workspace: TempDir) {
    let origin = workspace.path().join("origin");
    init_repository(&origin);
    let source = origin.to_str().expect("utf8 path");
    let dest_root = workspace.path().join("plugins");

    let local = GitFetcher::new()
        .fetch(source, &dest_root)
        .expect("fetch succeeds");

    assert_eq!(local, dest_root.join(plugin_id(source).as_str()));
    assert!(local.join("plugin.json").is_file());
}

#[rstest]
fn fetch_replaces_stale_checkout(workspace: TempDir) {
    let origin = workspace.path().join("origin");
    init_repository(&origin);
    let source = origin.to_str().expect("utf8 path");
    let local = workspace.path().join("checkout");
    fs::create_dir_all(&local).expect("create stale checkout");
    fs::write(local.join("stale"), "old").expect("write stale file");

    GitFetcher::new()
        .fetch_to(source, &local)
        .expect("fetch succeeds");

    assert!(!local.join("stale").exists());
    assert!(local.join("plugin.json").is_file());
}

#[rstest]
fn missing_repository_is_invalid_source(workspace: TempDir) {
    let source = workspace.path().join("missing");
    let local = workspace.path().join("checkout");

    let err = GitFetcher::new()
        .fetch_to(source.to_str().expect("utf8 path"), &local)
        .expect_err("fetch fails");

    assert!(
        matches!(err, FetchError::InvalidSource { .. }),
        "expected InvalidSource, got {err:?}"
    );
    assert!(!local.exists());
}

#[rstest]
fn failed_retrieval_leaves_no_checkout(workspace: TempDir) {
    let local = workspace.path().join("checkout");

    let err = PartialFetcher
        .fetch_to("https://example.com/repo", &local)
        .expect_err("fetch fails");

    assert!(matches!(err, FetchError::SourceUnreachable { .. }));
    assert!(!local.exists(), "partial checkout should be removed");
}
