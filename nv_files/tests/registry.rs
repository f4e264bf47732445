use std::sync::Arc;

use nv_files::{FileHandleRegistry, HandleError, PlaintextCipher, RegistryConfig};

fn registry() -> FileHandleRegistry {
    FileHandleRegistry::new(Arc::new(PlaintextCipher), RegistryConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_handle_opens_once() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let path = dir.path().join("x");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            let path = path.clone();
            tokio::spawn(async move { registry.get_handle(path).await.unwrap() })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
    assert_eq!(registry.handles_opened(), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_failure_reaches_every_waiter_and_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"regular file").unwrap();
    let path = blocker.join("child.map");
    let registry = registry();

    let (a, b) = tokio::join!(registry.get_handle(&path), registry.get_handle(&path));
    for result in [a, b] {
        match result {
            Err(HandleError::Open(err)) => assert_eq!(err.path, path),
            other => panic!("expected open error, got {other:?}"),
        }
    }
    assert!(!registry.contains(&path));
    assert_eq!(registry.handles_opened(), 0);

    std::fs::remove_file(&blocker).unwrap();
    let handle = registry.get_handle(&path).await.unwrap();
    assert_eq!(handle.path(), path);
    assert!(blocker.is_dir());
}

#[tokio::test]
async fn directory_path_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    assert!(matches!(
        registry.get_handle(dir.path()).await,
        Err(HandleError::Open(_))
    ));
}

#[tokio::test]
async fn handle_reports_file_state() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let path = dir.path().join("nested").join("data.bin");

    let guard = registry.lock(&path).await.unwrap();
    let handle = guard.handle().clone();
    assert!(handle.is_locked());
    assert!(!handle.is_file().await);
    assert_eq!(handle.file_size().await.unwrap(), 0);

    handle
        .write_file(&guard, bytes::Bytes::from_static(b"12345"))
        .await
        .unwrap();
    assert!(handle.is_file().await);
    assert_eq!(handle.file_size().await.unwrap(), 5);

    guard.release();
    assert!(!handle.is_locked());
}
