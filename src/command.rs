//! Compiles a selection into an `ansible-playbook` invocation.
//!
//! Pure functions only: the compiler sees file paths, never secret values.

use std::path::Path;

/// Builds the argv for a playbook run.
///
/// Limit patterns are joined with commas into a single `--limit` value; an
/// empty slice omits the flag entirely so ansible falls back to the play's
/// own host targeting. A vault secret is always passed by file path, never
/// via `--ask-vault-pass`.
pub fn build_playbook_command(
    inventory: &Path,
    playbook: &Path,
    limits: &[String],
    vault_file: Option<&Path>,
) -> Vec<String> {
    let mut cmd = vec![
        "ansible-playbook".to_string(),
        "-i".to_string(),
        inventory.display().to_string(),
        playbook.display().to_string(),
    ];
    if !limits.is_empty() {
        cmd.push("--limit".to_string());
        cmd.push(limits.join(","));
    }
    if let Some(path) = vault_file {
        cmd.push("--vault-password-file".to_string());
        cmd.push(path.display().to_string());
    }
    cmd
}

/// Renders the command for display, masking the vault file path.
///
/// The temp file name is not a secret itself, but showing it invites people
/// to go read it.
pub fn preview_command(cmd: &[String]) -> String {
    let mut masked: Vec<String> = Vec::with_capacity(cmd.len());
    let mut mask_next = false;
    for arg in cmd {
        if mask_next {
            masked.push("******".to_string());
            mask_next = false;
            continue;
        }
        if arg == "--vault-password-file" {
            mask_next = true;
        }
        masked.push(arg.clone());
    }
    shell_words::join(masked.iter().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths() -> (PathBuf, PathBuf) {
        (
            PathBuf::from("inventory"),
            PathBuf::from("playbooks/deploy.yml"),
        )
    }

    #[test]
    fn empty_limits_omit_the_flag() {
        let (inv, pb) = paths();
        let cmd = build_playbook_command(&inv, &pb, &[], None);
        assert_eq!(cmd, vec!["ansible-playbook", "-i", "inventory", "playbooks/deploy.yml"]);
    }

    #[test]
    fn limits_are_comma_joined_in_order() {
        let (inv, pb) = paths();
        let limits = vec!["sw1".to_string(), "A:&sw2".to_string(), "r1".to_string()];
        let cmd = build_playbook_command(&inv, &pb, &limits, None);
        assert_eq!(
            cmd,
            vec![
                "ansible-playbook",
                "-i",
                "inventory",
                "playbooks/deploy.yml",
                "--limit",
                "sw1,A:&sw2,r1",
            ]
        );
    }

    #[test]
    fn vault_file_adds_password_file_flag() {
        let (inv, pb) = paths();
        let vault = PathBuf::from("/tmp/playrack-vault-xyz");
        let cmd = build_playbook_command(&inv, &pb, &[], Some(&vault));
        assert_eq!(cmd[4], "--vault-password-file");
        assert_eq!(cmd[5], "/tmp/playrack-vault-xyz");
        assert!(!cmd.iter().any(|a| a == "--ask-vault-pass"));
    }

    #[test]
    fn preview_masks_the_vault_path() {
        let (inv, pb) = paths();
        let vault = PathBuf::from("/tmp/playrack-vault-xyz");
        let limits = vec!["sw1".to_string()];
        let cmd = build_playbook_command(&inv, &pb, &limits, Some(&vault));
        let preview = preview_command(&cmd);
        assert!(preview.contains("--vault-password-file '******'") || preview.contains("--vault-password-file ******"));
        assert!(!preview.contains("playrack-vault-xyz"));
    }

    #[test]
    fn preview_quotes_arguments_with_spaces() {
        let cmd = vec!["ansible-playbook".to_string(), "my playbook.yml".to_string()];
        let preview = preview_command(&cmd);
        assert_eq!(preview, "ansible-playbook 'my playbook.yml'");
    }
}
