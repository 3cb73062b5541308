//! Command Line Integration Tests
//!
//! ## Test Coverage
//!
//! - Help lists every subcommand
//! - Missing credentials fail fast with a readable report
//! - Invalid arguments are rejected by the parser

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    const CREDENTIAL_VARS: [&str; 5] = [
        "B2_ENDPOINT",
        "B2_BUCKET_NAME",
        "B2_KEY_ID",
        "B2_APPLICATION_KEY",
        "B2_REGION",
    ];

    fn clipvault() -> Command {
        let mut cmd = Command::cargo_bin("clipvault").unwrap();
        for var in CREDENTIAL_VARS {
            cmd.env_remove(var);
        }
        cmd.env_remove("RUST_LOG");
        cmd
    }

    // ========================================================================
    // TEST: Help
    // ========================================================================

    #[test]
    fn test_help_lists_subcommands() {
        clipvault()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("upload"))
            .stdout(predicate::str::contains("sync"))
            .stdout(predicate::str::contains("health"))
            .stdout(predicate::str::contains("list"));
    }

    // ========================================================================
    // TEST: Missing Credentials
    // ========================================================================

    #[test]
    fn test_health_without_credentials_reports_unhealthy() {
        clipvault()
            .args(["--log-level", "error", "health"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("\"healthy\": false"))
            .stdout(predicate::str::contains("B2_KEY_ID"));
    }

    #[test]
    fn test_list_without_credentials_fails() {
        clipvault()
            .args(["--log-level", "error", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Missing credentials"));
    }

    #[test]
    fn test_upload_missing_file_fails() {
        clipvault()
            .args([
                "--log-level",
                "error",
                "upload",
                "/nonexistent/clip.mp4",
                "--key",
                "users/42/clip.mp4",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read"));
    }

    // ========================================================================
    // TEST: Argument Parsing
    // ========================================================================

    #[test]
    fn test_unknown_strategy_rejected() {
        clipvault()
            .args(["sync", "--owner", "42", "--strategy", "turbo"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("turbo"));
    }

    #[test]
    fn test_sync_requires_owner() {
        clipvault()
            .arg("sync")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--owner"));
    }
}
