#![no_main]

use courier_e2e::{vault, PrivateKeyVault, VaultConfig, VaultPassword, WrappedPrivateKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let wrapped = WrappedPrivateKey::new(text);
    // Large round counts only slow the fuzzer down.
    match vault::inspect(&wrapped) {
        Ok(info) if info.iterations <= 10_000 => {}
        _ => return,
    }
    let vault = PrivateKeyVault::new(VaultConfig::insecure_fast());
    let _ = vault.unwrap(&wrapped, &VaultPassword::new("fuzz"));
});
