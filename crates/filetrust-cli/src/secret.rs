use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

/// Non-interactive password source for scripts and tests.
pub const PASSWORD_ENV: &str = "FILETRUST_PASSWORD";

/// Read the file password from the environment, or prompt on the terminal.
/// With `confirm`, an interactive prompt asks twice.
pub fn read_password(confirm: bool) -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(value));
    }
    let first = Zeroizing::new(rpassword::prompt_password("Password: ").context("read password")?);
    if confirm {
        let second = Zeroizing::new(
            rpassword::prompt_password("Confirm password: ").context("read password")?,
        );
        if *first != *second {
            bail!("passwords do not match");
        }
    }
    Ok(first)
}
