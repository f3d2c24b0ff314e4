use std::{env, path::PathBuf, time::Duration};

/// Environment variable holding the path of the JSON account config
pub const CREDENTIALS_PATH_ENV: &str = "AWS_CREDENTIALS_PATH";

/// Environment variable overriding the credential cache directory
pub const CACHE_DIR_ENV: &str = "AWSMFA_CACHE_DIR";

/// Default directory for cached session credentials
pub const DEFAULT_CACHE_DIR: &str = "/tmp/aws";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// AWS shared credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Default AWS region for IAM/STS calls when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Default program wrapped by `exec`
pub const DEFAULT_WRAPPED_PROGRAM: &str = "aws";

/// Default session duration requested from STS
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(6 * 60 * 60);

/// Default deadline for the whole token race
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between hardware key polls while no device is present
pub const HARDWARE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cached credentials expiring within this margin are treated as stale
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Length of a one-time MFA code
pub const MFA_CODE_LEN: usize = 6;

/// Primary hardware key helper and its "no device" marker
pub const YKMAN_PROGRAM: &str = "ykman";
pub const YKMAN_ARGS: &[&str] = &["oath", "code"];
pub const YKMAN_NOT_FOUND: &str = "No YubiKey detected!";

/// Legacy hardware key helper and its "no device" marker
pub const YUBIOATH_PROGRAM: &str = "yubioath";
pub const YUBIOATH_NOT_FOUND: &str = "No YubiKey found!";

/// Notice shown while waiting for a hardware key to be inserted
pub const INSERT_KEY_MSG: &str = "insert your yubikey please";

/// Cache root: `$AWSMFA_CACHE_DIR`, else `/tmp/aws`.
pub fn default_cache_dir() -> PathBuf {
    env_path(CACHE_DIR_ENV).unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
}

/// `~/.aws/config`, or `$AWS_CONFIG_FILE` when set.
pub fn get_aws_config_path() -> Option<PathBuf> {
    shared_aws_file("AWS_CONFIG_FILE", AWS_CONFIG_FILE_NAME)
}

/// `~/.aws/credentials`, or `$AWS_SHARED_CREDENTIALS_FILE` when set.
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    shared_aws_file("AWS_SHARED_CREDENTIALS_FILE", AWS_CREDENTIALS_FILE_NAME)
}

fn shared_aws_file(override_var: &str, file_name: &str) -> Option<PathBuf> {
    env_path(override_var)
        .or_else(|| dirs::home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(file_name)))
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}
