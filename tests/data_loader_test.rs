//! Integration tests for the engine reload pipeline: request ordering,
//! fingerprint identity, and build classification.

use std::path::Path;
use std::sync::Arc;

use kana_core::engine::{encode_dictionary, encode_dictionary_with_version, DictionaryBuilder};
use kana_core::loader::{DataLoader, EngineReloadRequest, ReloadStatus};
use tempfile::TempDir;

fn loader() -> DataLoader {
    DataLoader::new(Arc::new(DictionaryBuilder))
}

fn write_dictionary(dir: &Path, name: &str, entries: &[(&str, &str)]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode_dictionary(entries)).unwrap();
    path
}

// === Fingerprints ===

#[test]
fn fingerprint_is_stable_and_content_based() {
    let a = EngineReloadRequest::new("/data/a.dic");
    let same = EngineReloadRequest::new("/data/a.dic");
    let other_priority = EngineReloadRequest::new("/data/a.dic").with_priority(1);

    assert_eq!(DataLoader::fingerprint(&a), DataLoader::fingerprint(&same));
    assert_ne!(DataLoader::fingerprint(&a), DataLoader::fingerprint(&other_priority));
    assert_ne!(DataLoader::fingerprint(&a), 0);
}

// === Registration ===

#[test]
fn registering_same_request_twice_is_idempotent() {
    let loader = loader();
    let request = EngineReloadRequest::new("/data/a.dic");

    let first = loader.register_request(&request);
    let second = loader.register_request(&request);
    assert_eq!(first, second);
    assert_eq!(first, DataLoader::fingerprint(&request));
    assert_eq!(loader.pending_count(), 1);
}

#[test]
fn unregistered_request_is_ignored_on_resubmission() {
    let loader = loader();
    let request = EngineReloadRequest::new("/data/a.dic");
    let id = loader.register_request(&request);

    assert_eq!(loader.unregister_request(id), 0);
    assert_eq!(loader.register_request(&request), 0);
    assert_eq!(loader.pending_count(), 0);
}

#[test]
fn unregistered_request_returns_current_front() {
    let loader = loader();
    let keep = EngineReloadRequest::new("/data/keep.dic");
    let drop = EngineReloadRequest::new("/data/drop.dic").with_priority(10);
    let keep_id = loader.register_request(&keep);
    let drop_id = loader.register_request(&drop);
    assert_eq!(loader.front_id(), drop_id);

    assert_eq!(loader.unregister_request(drop_id), keep_id);
    assert_eq!(loader.register_request(&drop), keep_id);
}

#[test]
fn lower_priority_value_wins() {
    let loader = loader();
    let low = EngineReloadRequest::new("/data/low.dic").with_priority(200);
    let high = EngineReloadRequest::new("/data/high.dic").with_priority(5);

    loader.register_request(&high);
    let front = loader.register_request(&low);
    assert_eq!(front, DataLoader::fingerprint(&high));
}

#[test]
fn equal_priority_prefers_most_recent() {
    let loader = loader();
    let first = EngineReloadRequest::new("/data/first.dic");
    let second = EngineReloadRequest::new("/data/second.dic");

    loader.register_request(&first);
    assert_eq!(loader.register_request(&second), DataLoader::fingerprint(&second));
    // Re-registering moves a request back to the front.
    assert_eq!(loader.register_request(&first), DataLoader::fingerprint(&first));
    assert_eq!(loader.pending_count(), 2);
}

#[test]
fn clear_drops_pending_requests() {
    let loader = loader();
    loader.register_request(&EngineReloadRequest::new("/data/a.dic"));
    loader.register_request(&EngineReloadRequest::new("/data/b.dic"));
    loader.clear();
    assert_eq!(loader.pending_count(), 0);
    assert_eq!(loader.front_id(), 0);
}

// === Builds ===

#[test]
fn build_valid_file_is_reload_ready() {
    let dir = TempDir::new().unwrap();
    let path = write_dictionary(dir.path(), "good.dic", &[("かな", "仮名")]);
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path));

    let response = loader.build(id).into_response();
    assert_eq!(response.id, id);
    assert_eq!(response.status(), ReloadStatus::ReloadReady);
    let engine = response.engine.unwrap();
    assert_eq!(engine.lookup("かな"), ["仮名"]);
    assert_eq!(response.response.request.unwrap().file_path, path);
}

#[test]
fn build_handle_reports_readiness() {
    let dir = TempDir::new().unwrap();
    let path = write_dictionary(dir.path(), "good.dic", &[]);
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path));

    let handle = loader.build(id);
    assert_eq!(handle.id(), id);
    assert!(handle.response().is_none());

    let handle = handle.wait();
    assert!(handle.is_ready());
    assert_eq!(handle.response().unwrap().status(), ReloadStatus::ReloadReady);
}

#[test]
fn build_unknown_id_is_data_missing() {
    let response = loader().build(42).into_response();
    assert_eq!(response.status(), ReloadStatus::DataMissing);
    assert!(response.engine.is_none());
    assert!(response.response.request.is_none());
}

#[test]
fn build_missing_file_is_data_missing() {
    let dir = TempDir::new().unwrap();
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(dir.path().join("absent.dic")));
    assert_eq!(loader.build(id).into_response().status(), ReloadStatus::DataMissing);
}

#[test]
fn build_garbage_file_is_data_broken() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.dic");
    std::fs::write(&path, b"definitely not a dictionary").unwrap();
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path));
    assert_eq!(loader.build(id).into_response().status(), ReloadStatus::DataBroken);
}

#[test]
fn build_with_wrong_magic_is_data_broken() {
    let dir = TempDir::new().unwrap();
    let path = write_dictionary(dir.path(), "good.dic", &[]);
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path).with_magic_number(*b"OTHERMAG"));
    assert_eq!(loader.build(id).into_response().status(), ReloadStatus::DataBroken);
}

#[test]
fn build_other_format_version_is_version_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.dic");
    std::fs::write(&path, encode_dictionary_with_version(&[], 99)).unwrap();
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path));
    assert_eq!(
        loader.build(id).into_response().status(),
        ReloadStatus::EngineVersionMismatch
    );
}

#[test]
fn build_installs_data_file() {
    let dir = TempDir::new().unwrap();
    let path = write_dictionary(dir.path(), "download.dic", &[("き", "木")]);
    let target = dir.path().join("installed").join("system.dic");
    let loader = loader();
    let id = loader.register_request(&EngineReloadRequest::new(&path).with_install_location(&target));

    let response = loader.build(id).into_response();
    assert_eq!(response.status(), ReloadStatus::ReloadReady);
    assert_eq!(std::fs::read(&target).unwrap(), std::fs::read(&path).unwrap());
}

#[test]
fn build_with_unwritable_install_location_is_install_failure() {
    let dir = TempDir::new().unwrap();
    let path = write_dictionary(dir.path(), "download.dic", &[]);
    // A regular file where the install directory should be.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let loader = loader();
    let id = loader.register_request(
        &EngineReloadRequest::new(&path).with_install_location(blocker.join("system.dic")),
    );

    let response = loader.build(id).into_response();
    assert_eq!(response.status(), ReloadStatus::InstallFailure);
    assert!(response.engine.is_none());
}
