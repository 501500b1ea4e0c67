mod common;

use proptest::prelude::*;

use courier_e2e::symmetric::{self, generate_key_and_iv};
use courier_e2e::{
    decrypt_with_private_key, encrypt_with_public_key, AesKey, DecryptionError, EncryptionError,
    PrivateKeyVault, PublicKey, VaultConfig, VaultPassword, WrongPasswordError,
};

use common::{alice_keys, bob_keys};

// ---------------------------------------------------------------------------
// Symmetric
// ---------------------------------------------------------------------------

#[test]
fn symmetric_roundtrip_edge_plaintexts() {
    let long = "0123456789abcdef".repeat(128);
    for text in ["", "hello", "héllo wörld ✓ 你好 🚀", long.as_str()] {
        let (key, iv) = generate_key_and_iv();
        let ct = symmetric::encrypt(text, &key, &iv);
        assert_eq!(symmetric::decrypt(&ct, &key, &iv).unwrap(), text);
    }
}

proptest! {
    #[test]
    fn symmetric_roundtrip_any_text(text in any::<String>()) {
        let (key, iv) = generate_key_and_iv();
        let ct = symmetric::encrypt(&text, &key, &iv);
        prop_assert_eq!(symmetric::decrypt(&ct, &key, &iv).unwrap(), text);
    }
}

// ---------------------------------------------------------------------------
// Asymmetric
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn rsa_wraps_any_aes_key(bytes in any::<[u8; 32]>()) {
        let keys = alice_keys();
        let wrapped = encrypt_with_public_key(&bytes, &keys.public_key_pem).unwrap();
        let unwrapped = decrypt_with_private_key(&wrapped, &keys.private_key_pem).unwrap();
        prop_assert_eq!(unwrapped.as_slice(), &bytes[..]);
    }
}

#[test]
fn rsa_wrap_of_generated_key() {
    let key = AesKey::generate();
    let keys = bob_keys();
    let wrapped = encrypt_with_public_key(key.as_bytes(), &keys.public_key_pem).unwrap();
    let raw = decrypt_with_private_key(&wrapped, &keys.private_key_pem).unwrap();
    assert_eq!(AesKey::try_from(raw.as_slice()).unwrap(), key);
}

#[test]
fn rsa_wrong_private_key_is_generic_failure() {
    let wrapped = encrypt_with_public_key(&[7u8; 32], &alice_keys().public_key_pem).unwrap();
    assert_eq!(
        decrypt_with_private_key(&wrapped, &bob_keys().private_key_pem),
        Err(DecryptionError)
    );
    assert_eq!(
        decrypt_with_private_key("not base64!", &bob_keys().private_key_pem),
        Err(DecryptionError)
    );
}

#[test]
fn rsa_capacity_limit() {
    let pk = PublicKey::from_pem(&alice_keys().public_key_pem).unwrap();
    let max = pk.max_plaintext_len();
    assert_eq!(max, 256 - 2 * 32 - 2);
    assert!(pk.encrypt(&vec![0u8; max]).is_ok());
    assert_eq!(
        pk.encrypt(&vec![0u8; max + 1]),
        Err(EncryptionError::PlaintextTooLarge { len: max + 1, max })
    );
    assert_eq!(
        encrypt_with_public_key(b"k", "-----BEGIN PUBLIC KEY-----\ngarbage\n-----END PUBLIC KEY-----"),
        Err(EncryptionError::InvalidKey)
    );
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn vault_roundtrip_any_password(pw in "\\PC{1,40}") {
        let vault = PrivateKeyVault::new(VaultConfig::insecure_fast());
        let pem = &alice_keys().private_key_pem;
        let password = VaultPassword::new(pw.clone());
        let wrapped = vault.wrap(pem, &password).unwrap();
        let unwrapped = vault.unwrap(&wrapped, &password).unwrap();
        prop_assert_eq!(unwrapped.as_str(), pem.as_str());

        let other = VaultPassword::new(format!("{}!", pw));
        prop_assert_eq!(vault.unwrap(&wrapped, &other), Err(WrongPasswordError));
    }
}
