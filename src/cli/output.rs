use std::path::Path;

use vaultboot::health::HealthReport;
use vaultboot::openbao::SealStatus;
use vaultboot::seal::{ClusterSealState, KeyShareSet, SealOutcome};
use vaultboot::secrets::SecretBundle;

const MASK: &str = "****";
const VISIBLE_SUFFIX_CHARS: usize = 4;

pub(crate) struct InitSummary<'a> {
    pub(crate) addr: &'a str,
    pub(crate) shares: &'a KeyShareSet,
    pub(crate) threshold: u8,
    pub(crate) keys_file: &'a Path,
    pub(crate) root_token_file: &'a Path,
    pub(crate) show_secrets: bool,
}

pub(crate) fn print_init_summary(summary: &InitSummary<'_>) {
    println!("Secret store initialized at {}", summary.addr);
    println!(
        "  key shares: {} (threshold {})",
        summary.shares.len(),
        summary.threshold
    );
    for (idx, share) in summary.shares.shares().iter().enumerate() {
        println!(
            "  share {}: {}",
            idx + 1,
            display_secret(share, summary.show_secrets)
        );
    }
    if let Some(token) = summary.shares.root_token() {
        println!(
            "  root token: {}",
            display_secret(token, summary.show_secrets)
        );
    }
    println!("  keys file: {}", summary.keys_file.display());
    println!("  root token file: {}", summary.root_token_file.display());
    println!("Store the key shares separately; the keys file is the only copy on this host.");
}

pub(crate) fn print_unseal_outcome(outcome: &SealOutcome) {
    match outcome {
        SealOutcome::AlreadyUnsealed => println!("Secret store is already unsealed"),
        SealOutcome::Unsealed { submitted } => {
            println!("Secret store unsealed ({submitted} share(s) submitted)");
        }
    }
}

pub(crate) fn print_status(
    addr: &str,
    report: &HealthReport,
    seal: Option<&(ClusterSealState, SealStatus)>,
) {
    println!("Secret store: {addr}");
    println!("  reachable: yes");
    if let Some(version) = &report.version {
        println!("  version: {version}");
    }
    let Some((state, status)) = seal else {
        println!("  state: unknown");
        return;
    };
    println!("  state: {state}");
    if let (Some(t), Some(n)) = (status.t, status.n) {
        println!("  threshold: {t} of {n}");
    }
    if status.sealed
        && let Some(progress) = status.progress
    {
        println!("  unseal progress: {progress}");
    }
}

pub(crate) fn print_bundle(bundle: &SecretBundle, show_secrets: bool) {
    match bundle.version() {
        Some(version) => println!("{} (version {version})", bundle.identity()),
        None => println!("{}", bundle.identity()),
    }
    for (field, value) in bundle.iter() {
        println!("  {field} = {}", display_secret(value, show_secrets));
    }
}

pub(crate) fn display_secret(value: &str, show_secrets: bool) -> String {
    if show_secrets {
        value.to_string()
    } else {
        mask_value(value)
    }
}

/// Masks all but the last few characters; short values are fully masked.
pub(crate) fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() <= VISIBLE_SUFFIX_CHARS * 2 {
        return MASK.to_string();
    }
    let suffix: String = chars[chars.len() - VISIBLE_SUFFIX_CHARS..].iter().collect();
    format!("{MASK}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_secret_masks_when_hidden() {
        assert_eq!(display_secret("supersecret", false), "****cret");
        assert_eq!(display_secret("showme", true), "showme");
    }

    #[test]
    fn test_mask_value_hides_short_values_entirely() {
        assert_eq!(mask_value("hunter2"), "****");
        assert_eq!(mask_value(""), "****");
    }

    #[test]
    fn test_mask_value_is_char_safe() {
        assert_eq!(mask_value("pässwörd-ünïcode"), "****code");
    }
}
