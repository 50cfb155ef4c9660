//! Password storage and authentication flow

use std::fs;
use std::path::Path;
use tempfile::tempdir;
use ugm_rs::{Ugm, UgmError};

fn make_ugm(dir: &Path) -> Ugm {
    Ugm::new(
        dir.join("users"),
        dir.join("groups"),
        dir.join("roles"),
        dir.join("principal_data"),
    )
}

#[test]
fn test_no_password_never_authenticates() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    ugm.users().create("max", &[]).unwrap();
    assert!(!ugm.users().authenticate("max", "secret").unwrap());
    assert!(!ugm.users().authenticate("max", "").unwrap());
}

#[test]
fn test_unknown_user_never_authenticates() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    assert!(!ugm.users().authenticate("inexistent", "secret").unwrap());
}

#[test]
fn test_set_and_change_password() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    let users = ugm.users();
    users.create("max", &[]).unwrap();

    users.passwd("max", None, "secret").unwrap();
    assert!(users.authenticate("max", "secret").unwrap());
    assert!(!users.authenticate("max", "wrong").unwrap());

    users.passwd("max", Some("secret"), "secret1").unwrap();
    assert!(!users.authenticate("max", "secret").unwrap());
    assert!(users.authenticate("max", "secret1").unwrap());
}

#[test]
fn test_passwd_failures() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    let users = ugm.users();
    users.create("max", &[]).unwrap();
    users.passwd("max", None, "secret").unwrap();

    assert!(matches!(
        users.passwd("sepp", None, "secret"),
        Err(UgmError::KeyNotFound(_))
    ));
    // a wrong old password leaves the stored one valid
    assert!(matches!(
        users.passwd("max", Some("wrong"), "new"),
        Err(UgmError::PasswordMismatch)
    ));
    assert!(users.authenticate("max", "secret").unwrap());
    assert!(!users.authenticate("max", "new").unwrap());
}

#[test]
fn test_passwd_persists_immediately() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    ugm.users().create("max", &[]).unwrap();
    ugm.users().passwd("max", None, "secret").unwrap();

    let raw = fs::read_to_string(dir.path().join("users")).unwrap();
    assert!(raw.starts_with("max:"));
    assert!(raw.trim_end().len() > "max:".len());

    // a fresh root authenticates against the persisted value
    let reloaded = make_ugm(dir.path());
    assert!(reloaded.users().authenticate("max", "secret").unwrap());
    assert!(!reloaded.users().authenticate("max", "wrong").unwrap());
}

#[test]
fn test_stored_format_is_hash_then_salt() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use sha2::{Digest, Sha256};

    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    let users = ugm.users();
    users.create("max", &[]).unwrap();
    users.passwd("max", None, "secret").unwrap();

    let stored = users.get("max").unwrap().attr("password").unwrap();
    let decoded = BASE64.decode(stored.as_text().unwrap()).unwrap();
    // sha256 digest followed by the 8 byte salt
    assert_eq!(decoded.len(), 32 + 8);
    let (digest, salt) = decoded.split_at(32);
    let mut input = b"secret".to_vec();
    input.extend_from_slice(salt);
    assert_eq!(digest, Sha256::digest(&input).as_slice());
}

#[test]
fn test_authenticate_via_user_handle() {
    let dir = tempdir().unwrap();
    let ugm = make_ugm(dir.path());
    let user = ugm.users().create("max", &[]).unwrap();
    assert!(!user.authenticate("secret").unwrap());
    user.passwd(None, "secret").unwrap();
    assert!(user.authenticate("secret").unwrap());
    assert!(matches!(
        user.passwd(Some("wrong"), "new"),
        Err(UgmError::PasswordMismatch)
    ));
}
