//! Destination-side permission application for finalised files.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TransferError;

/// Permission strategy tag, keyed by a relative path's first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Drop explicit entries and inherit from the parent (safest).
    StripAll,
    /// Leave whatever the file was created with.
    PreserveOriginal,
    /// Restrict to the receiving user.
    AssignToDestination,
    /// Strip, then grant the receiving user standard access.
    Hybrid,
}

/// What to do with one finalised file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionAction {
    /// Apply a security descriptor in SDDL form.
    Sddl(String),
    /// Apply a mode strategy.
    Mode(PermissionMode),
    /// Reset to the platform's safe default.
    StripInherited,
}

/// Picks the action for a file; first match wins:
/// header SDDL, per-path override, first-segment mode, then strip.
pub fn resolve_permission_action(
    header_sddl: Option<&str>,
    relative_path: &str,
    acl_overrides: &HashMap<String, String>,
    permission_modes: &HashMap<String, PermissionMode>,
) -> PermissionAction {
    if let Some(sddl) = header_sddl.filter(|s| !s.is_empty()) {
        return PermissionAction::Sddl(sddl.to_string());
    }
    if let Some(sddl) = acl_overrides.get(relative_path) {
        return PermissionAction::Sddl(sddl.clone());
    }
    let first_segment = relative_path.split('/').next().unwrap_or_default();
    if let Some(mode) = permission_modes.get(first_segment) {
        return PermissionAction::Mode(*mode);
    }
    PermissionAction::StripInherited
}

/// Applies `action` to the file at `path`.
pub async fn apply_permissions(path: &Path, action: &PermissionAction) -> Result<(), TransferError> {
    debug!(path = %path.display(), ?action, "applying permissions");
    platform::apply(path, action).await
}

#[cfg(unix)]
mod platform {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use tracing::debug;

    use super::{PermissionAction, PermissionMode};
    use crate::TransferError;

    pub(super) fn mode_bits(action: &PermissionAction) -> Option<u32> {
        match action {
            PermissionAction::Sddl(_) => None,
            PermissionAction::StripInherited | PermissionAction::Mode(PermissionMode::StripAll) => {
                Some(0o644)
            }
            PermissionAction::Mode(PermissionMode::PreserveOriginal) => None,
            PermissionAction::Mode(PermissionMode::Hybrid) => Some(0o640),
            PermissionAction::Mode(PermissionMode::AssignToDestination) => Some(0o600),
        }
    }

    pub(super) async fn apply(path: &Path, action: &PermissionAction) -> Result<(), TransferError> {
        if let PermissionAction::Sddl(sddl) = action {
            debug!(path = %path.display(), %sddl, "SDDL has no POSIX equivalent; left as created");
            return Ok(());
        }
        if let Some(bits) = mode_bits(action) {
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
                .await
                .map_err(|e| TransferError::Permission(format!("chmod {bits:o}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::path::Path;

    use tracing::warn;

    use super::{PermissionAction, PermissionMode};
    use crate::TransferError;

    pub(super) async fn apply(path: &Path, action: &PermissionAction) -> Result<(), TransferError> {
        match action {
            PermissionAction::Sddl(sddl) => set_sddl(path, sddl).await,
            PermissionAction::Mode(PermissionMode::PreserveOriginal) => Ok(()),
            PermissionAction::Mode(PermissionMode::StripAll) | PermissionAction::StripInherited => {
                reset_acl(path).await
            }
            PermissionAction::Mode(mode) => {
                // Assigning to a destination user needs a SID we are not given.
                warn!(path = %path.display(), ?mode, "no destination user; stripping instead");
                reset_acl(path).await
            }
        }
    }

    async fn reset_acl(path: &Path) -> Result<(), TransferError> {
        let output = tokio::process::Command::new("icacls")
            .arg(path)
            .arg("/reset")
            .arg("/q")
            .output()
            .await
            .map_err(|e| TransferError::Permission(format!("failed to run icacls: {e}")))?;
        if !output.status.success() {
            return Err(TransferError::Permission(format!(
                "icacls /reset failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn set_sddl(path: &Path, sddl: &str) -> Result<(), TransferError> {
        let script = "$acl = Get-Acl -LiteralPath $env:SAKNET_TARGET; \
             $acl.SetSecurityDescriptorSddlForm($env:SAKNET_SDDL); \
             Set-Acl -LiteralPath $env:SAKNET_TARGET -AclObject $acl";
        let output = tokio::process::Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", script])
            .env("SAKNET_TARGET", path)
            .env("SAKNET_SDDL", sddl)
            .output()
            .await
            .map_err(|e| TransferError::Permission(format!("failed to run powershell: {e}")))?;
        if !output.status.success() {
            return Err(TransferError::Permission(format!(
                "Set-Acl failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use std::path::Path;

    use super::PermissionAction;
    use crate::TransferError;

    pub(super) async fn apply(_path: &Path, _action: &PermissionAction) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> HashMap<String, String> {
        HashMap::from([("alice/notes.txt".to_string(), "D:P(A;;FA;;;BA)".to_string())])
    }

    fn modes() -> HashMap<String, PermissionMode> {
        HashMap::from([
            ("alice".to_string(), PermissionMode::AssignToDestination),
            ("bob".to_string(), PermissionMode::PreserveOriginal),
        ])
    }

    #[test]
    fn header_sddl_wins() {
        let action = resolve_permission_action(
            Some("D:P(A;;FA;;;SY)"),
            "alice/notes.txt",
            &overrides(),
            &modes(),
        );
        assert_eq!(action, PermissionAction::Sddl("D:P(A;;FA;;;SY)".into()));
    }

    #[test]
    fn empty_header_sddl_falls_through_to_override() {
        let action = resolve_permission_action(Some(""), "alice/notes.txt", &overrides(), &modes());
        assert_eq!(action, PermissionAction::Sddl("D:P(A;;FA;;;BA)".into()));
    }

    #[test]
    fn mode_by_first_segment() {
        let action = resolve_permission_action(None, "alice/docs/a.txt", &overrides(), &modes());
        assert_eq!(action, PermissionAction::Mode(PermissionMode::AssignToDestination));

        let action = resolve_permission_action(None, "bob", &overrides(), &modes());
        assert_eq!(action, PermissionAction::Mode(PermissionMode::PreserveOriginal));
    }

    #[test]
    fn default_is_strip() {
        let action = resolve_permission_action(None, "carol/a.txt", &overrides(), &modes());
        assert_eq!(action, PermissionAction::StripInherited);
    }

    #[test]
    fn mode_tags_are_snake_case() {
        let mode: PermissionMode = serde_json::from_str("\"assign_to_destination\"").unwrap();
        assert_eq!(mode, PermissionMode::AssignToDestination);
        assert_eq!(serde_json::to_string(&PermissionMode::StripAll).unwrap(), "\"strip_all\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_modes_apply_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"x").unwrap();

        apply_permissions(&path, &PermissionAction::Mode(PermissionMode::AssignToDestination))
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        apply_permissions(&path, &PermissionAction::StripInherited).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);

        // SDDL is passed through untouched.
        apply_permissions(&path, &PermissionAction::Sddl("D:P".into())).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
