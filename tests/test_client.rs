//! Client, forwarding client and shell client against a scripted gkfs.io.

mod common;

use std::path::Path;
use std::time::Duration;

use common::Fixture;
use gkfs_harness::client::{CLIENT_LIBRARY, FWD_CLIENT_LIBRARY};
use gkfs_harness::{
    Client, FileCreator, FwdClient, HarnessError, OpResult, Operation, ShellClient, ShellOptions,
    SizeUnit,
};
use nix::sys::signal::Signal;

fn client_fixture() -> Fixture {
    let fixture = Fixture::new().with_fake_client();
    fixture.library(CLIENT_LIBRARY);
    fixture.library(FWD_CLIENT_LIBRARY);
    fixture
}

#[tokio::test]
async fn test_mkdir_positional_output() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();

    let ok = client.mkdir(&ws.mount_dir().join("dir"), 0o755).await.unwrap();
    assert_eq!(ok.retval(), 0);
    assert_eq!(ok.errno(), 0);

    let failed = client.mkdir(Path::new("/missing/dir"), 0o755).await.unwrap();
    assert_eq!(failed.retval(), -1);
    assert_eq!(failed.errno(), libc::ENOENT as i64);
}

#[tokio::test]
async fn test_json_and_buffers() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();
    let file = ws.mount_dir().join("file");

    let open = client.open(&file, libc::O_CREAT | libc::O_WRONLY, 0o644).await.unwrap();
    assert!(matches!(open, OpResult::Open(_)));
    assert_eq!(open.retval(), 3);

    let read = client.read(&file, 2).await.unwrap();
    assert_eq!(read.buf(), Some(&b"hi"[..]));

    let readv = client.readv(&file, 2, 0).await.unwrap();
    assert_eq!(readv.bufs(), Some([Some(&[1u8, 2][..]), None]));

    let written = client.write(&file, "hello", 5).await.unwrap();
    assert_eq!(written.retval(), 5);
}

#[tokio::test]
async fn test_directory_listing_keeps_order() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();

    let listing = client.readdir(ws.mount_dir()).await.unwrap();
    let names: Vec<_> = listing
        .dirents()
        .unwrap()
        .iter()
        .map(|d| d.d_name.as_str())
        .collect();
    assert_eq!(names, vec![".", "file_a"]);

    let opendir = client.opendir(ws.mount_dir()).await.unwrap();
    assert_eq!(opendir.retval(), 0);
    assert_eq!(opendir.errno(), libc::ENOENT as i64);
}

#[tokio::test]
async fn test_client_environment_is_patched() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();
    client.mkdir(&ws.mount_dir().join("d"), 0o700).await.unwrap();

    let env = std::fs::read_to_string(ws.log_dir().join("last-client-env")).unwrap();
    assert!(env.contains(&format!("LD_PRELOAD={}", client.preload_library().display())));
    assert!(env.contains(&format!(
        "LIBGKFS_HOSTS_FILE={}",
        ws.twd().join("gkfs_hosts.txt").display()
    )));
    assert!(env.contains("LIBGKFS_LOG=all"));
    assert!(!env.contains("LIBGKFS_FORWARDING_MAP_FILE"));
}

#[tokio::test]
async fn test_unknown_operation_rejected_before_spawn() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();

    let err = client.run_named("chmod", &[]).await.unwrap_err();
    assert!(matches!(err, HarnessError::Decode(_)), "got {:?}", err);
    assert!(!ws.log_dir().join("last-client-env").exists());
}

#[tokio::test]
async fn test_nonzero_exit_and_garbage_output() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let client = Client::new(&ws, &fixture.config).unwrap();

    match client.run(Operation::Rmdir, &["/x".to_string()]).await.unwrap_err() {
        HarnessError::CommandFailed { stderr, .. } => assert!(stderr.contains("boom")),
        other => panic!("expected CommandFailed, got {:?}", other),
    }

    let err = client.run(Operation::Truncate, &["/x".into(), "0".into()]).await.unwrap_err();
    assert!(matches!(err, HarnessError::Decode(_)), "got {:?}", err);
}

#[test]
fn test_preload_library_must_be_unique() {
    let mut fixture = client_fixture();
    let second = tempfile::tempdir().unwrap();
    std::fs::write(second.path().join(CLIENT_LIBRARY), b"").unwrap();
    fixture.config.bin_dirs.push(second.path().to_path_buf());

    let ws = fixture.workspace();
    match Client::new(&ws, &fixture.config).unwrap_err() {
        HarnessError::PreloadLibrary { found, .. } => assert_eq!(found.len(), 2),
        other => panic!("expected PreloadLibrary, got {:?}", other),
    }
}

#[test]
fn test_preload_library_missing() {
    let fixture = Fixture::new().with_fake_client();
    let ws = fixture.workspace();
    match Client::new(&ws, &fixture.config).unwrap_err() {
        HarnessError::PreloadLibrary { found, .. } => assert!(found.is_empty()),
        other => panic!("expected PreloadLibrary, got {:?}", other),
    }
}

#[tokio::test]
async fn test_forwarding_client_map() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let host = nix::unistd::gethostname().unwrap().to_string_lossy().into_owned();

    let client = FwdClient::new(&ws, &fixture.config, "client-3").unwrap();
    assert_eq!(client.map_path(), ws.twd().join("client-3-gkfs_forwarding.map"));
    assert_eq!(client.log_path(), ws.log_dir().join("client-3-gkfwd_client.log"));
    assert_eq!(
        std::fs::read_to_string(client.map_path()).unwrap(),
        format!("{} 3\n", host)
    );
    assert!(client.preload_library().ends_with(FWD_CLIENT_LIBRARY));

    client.remap("client-1").unwrap();
    assert_eq!(
        std::fs::read_to_string(client.map_path()).unwrap(),
        format!("{} 1\n", host)
    );

    // Deref to Client
    let result = client.mkdir(&ws.mount_dir().join("d"), 0o755).await.unwrap();
    assert_eq!(result.retval(), 0);
    let env = std::fs::read_to_string(ws.log_dir().join("last-client-env")).unwrap();
    assert!(env.contains("LIBGKFS_FORWARDING_MAP_FILE="));
}

#[test]
fn test_forwarding_identifier_needs_number() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let err = FwdClient::new(&ws, &fixture.config, "client").unwrap_err();
    assert!(matches!(err, HarnessError::InvalidIdentifier(_)));
}

fn plain_shell(shell: &ShellClient) -> ShellOptions {
    ShellOptions {
        intercept_shell: false,
        ..shell.options()
    }
}

#[tokio::test]
async fn test_shell_exit_codes_are_data() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::new(&ws, &fixture.config).unwrap();

    let result = shell
        .script_with("echo out; echo err >&2; exit 7", plain_shell(&shell))
        .await
        .unwrap();
    assert_eq!(result.exit_code(), Some(7));
    assert!(!result.timed_out);
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
}

#[tokio::test]
async fn test_shell_timeout_kills_command() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::new(&ws, &fixture.config).unwrap();

    let options = ShellOptions {
        timeout: Duration::from_millis(300),
        timeout_signal: Signal::SIGKILL,
        ..plain_shell(&shell)
    };
    let started = std::time::Instant::now();
    let result = shell.run_with("sleep", &[30], options).await.unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code(), None);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_shell_timeout_bounds_compound_script() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::new(&ws, &fixture.config).unwrap();

    let options = ShellOptions {
        timeout: Duration::from_millis(500),
        timeout_signal: Signal::SIGKILL,
        ..plain_shell(&shell)
    };
    let started = std::time::Instant::now();
    // bash forks for `sleep` here; the child keeps stdout open
    let result = shell
        .script_with("echo started; sleep 6; echo done", options)
        .await
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code(), None);
    assert_eq!(result.stdout, "started\n");
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "returned after {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_shell_digest_matches_test_file() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::new(&ws, &fixture.config).unwrap();

    let file = FileCreator::new(&ws).create("data", 2.0, SizeUnit::KibiByte).unwrap();
    let path = file.pathname.display().to_string();
    let result = shell
        .run_with("sha256sum", &[path.as_str()], plain_shell(&shell))
        .await
        .unwrap();
    assert_eq!(result.exit_code(), Some(0));

    let parsed = result.parsed_stdout().unwrap();
    let digest = parsed.as_digest().unwrap();
    assert_eq!(digest.digest, file.sha256sum().unwrap());
    assert_eq!(digest.filename, path);
}

#[tokio::test]
async fn test_shell_stat_terse() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::new(&ws, &fixture.config).unwrap();

    let file = FileCreator::new(&ws).create("sized", 3.0, SizeUnit::Byte).unwrap();
    let path = file.pathname.display().to_string();
    let result = shell
        .run_with("stat", &["--terse", path.as_str()], plain_shell(&shell))
        .await
        .unwrap();

    let parsed = result.parsed_stdout().unwrap();
    let stat = parsed.as_stat().unwrap();
    assert_eq!(stat.filename, path);
    assert_eq!(stat.size, 3);
    assert_eq!(stat.hard_links, 1);
}

#[tokio::test]
async fn test_forwarding_shell_shares_one_map() {
    let fixture = client_fixture();
    let ws = fixture.workspace();
    let shell = ShellClient::forwarding(&ws, &fixture.config).unwrap();

    let host = nix::unistd::gethostname().unwrap().to_string_lossy().into_owned();
    let map = std::fs::read_to_string(ws.twd().join("gkfs_forwarding.map")).unwrap();
    assert_eq!(map, format!("{} 0\n", host));

    let environ = shell.patched_environ();
    assert!(environ.contains("LD_PRELOAD=\""));
    assert!(environ.contains("LIBGKFS_FORWARDING_MAP_FILE=\""));
}
