// Integration tests for the local folder source: listing, skipped directories,
// depth limits, hashing and fetching.

use rag_sync_core::contract::{ContentFetcher, SourceLister};
use rag_sync_core::download::{
    content_hash, content_type_for, file_hash, FolderConfig, FolderSource,
};
use rag_sync_core::error::{FetchError, SourceListError};
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn folder(root: &Path) -> FolderConfig {
    FolderConfig {
        root: root.to_path_buf(),
        recursive: true,
        max_depth: None,
        hash_contents: true,
    }
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "readme.md", "# hello");
    write(dir.path(), "docs/guide.pdf", "%PDF-1.4 guide");
    write(dir.path(), "docs/deep/notes.txt", "notes");
    write(dir.path(), ".git/HEAD", "ref: refs/heads/main");
    write(dir.path(), "target/debug/out.bin", "binary");
    dir
}

#[tokio::test]
async fn test_lists_files_recursively_with_relative_ids() {
    let dir = fixture();
    let source = FolderSource::new(folder(dir.path()));

    let items = source.list().await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["docs/deep/notes.txt", "docs/guide.pdf", "readme.md"]);

    let guide = items.iter().find(|i| i.id == "docs/guide.pdf").unwrap();
    assert_eq!(guide.name, "guide.pdf");
    assert_eq!(guide.path, "docs/guide.pdf");
    assert_eq!(guide.size, Some("%PDF-1.4 guide".len() as u64));
    assert!(guide.last_modified.is_some());
    assert!(guide.modified_at.is_some());
    assert_eq!(guide.content_hash.as_deref(), Some(content_hash(b"%PDF-1.4 guide").as_str()));
    assert_eq!(guide.metadata.get("extension").map(String::as_str), Some("pdf"));
}

#[tokio::test]
async fn test_depth_and_recursion_limits() {
    let dir = fixture();

    let shallow = FolderSource::new(FolderConfig {
        max_depth: Some(1),
        ..folder(dir.path())
    });
    let ids: Vec<String> = shallow.list().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["docs/guide.pdf".to_string(), "readme.md".to_string()]);

    let flat = FolderSource::new(FolderConfig {
        recursive: false,
        ..folder(dir.path())
    });
    let ids: Vec<String> = flat.list().await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["readme.md".to_string()]);
}

#[tokio::test]
async fn test_hashing_can_be_disabled() {
    let dir = fixture();
    let source = FolderSource::new(FolderConfig {
        hash_contents: false,
        ..folder(dir.path())
    });
    let items = source.list().await.unwrap();
    assert!(items.iter().all(|i| i.content_hash.is_none()));
}

#[tokio::test]
async fn test_listing_is_stable_for_unchanged_files() {
    let dir = fixture();
    let source = FolderSource::new(folder(dir.path()));
    let first = source.list().await.unwrap();
    let second = source.list().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_root_fails_listing() {
    let dir = tempfile::tempdir().unwrap();
    let source = FolderSource::new(folder(&dir.path().join("does-not-exist")));
    let err = source.list().await.unwrap_err();
    assert!(matches!(err, SourceListError::MissingRoot(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_reads_bytes_and_content_type() {
    let dir = fixture();
    let source = FolderSource::new(folder(dir.path()));
    let items = source.list().await.unwrap();
    let guide = items.iter().find(|i| i.id == "docs/guide.pdf").unwrap();

    let fetched = source.fetch(guide).await.unwrap();
    assert_eq!(fetched.file_name, "guide.pdf");
    assert_eq!(fetched.content_type, "application/pdf");
    assert_eq!(fetched.bytes, b"%PDF-1.4 guide");
}

#[tokio::test]
async fn test_fetch_of_vanished_file_is_not_found() {
    let dir = fixture();
    let source = FolderSource::new(folder(dir.path()));
    let items = source.list().await.unwrap();
    let readme = items.iter().find(|i| i.id == "readme.md").unwrap().clone();
    fs::remove_file(dir.path().join("readme.md")).unwrap();

    let err = source.fetch(&readme).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_listed_hash_is_streamed_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    // Larger than one copy buffer, so the digest spans several reads.
    let content: String = (0..50_000).map(|i| format!("line {i}\n")).collect();
    write(dir.path(), "big.txt", &content);

    let hashed = file_hash(&dir.path().join("big.txt")).unwrap();
    assert_eq!(hashed, content_hash(content.as_bytes()));

    let items = FolderSource::new(folder(dir.path())).list().await.unwrap();
    assert_eq!(items[0].content_hash.as_deref(), Some(hashed.as_str()));
    assert_eq!(items[0].size, Some(content.len() as u64));
}

#[test]
fn test_content_type_inference() {
    let cases = [
        ("report.PDF", "application/pdf"),
        ("notes.md", "text/markdown"),
        ("table.csv", "text/csv"),
        ("page.htm", "text/html"),
        ("no_extension", "application/octet-stream"),
        ("archive.tar.gz", "application/octet-stream"),
    ];
    for (name, expected) in cases {
        assert_eq!(content_type_for(name), expected, "content type of {name}");
    }
}
