use pulse_error::{AppError, AppResult};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 50;
const PASSWORD_MIN_LEN: usize = 6;

pub fn validate_registration(username: &str, email: &str, password: &str) -> AppResult<()> {
    let username_len = username.trim().chars().count();
    if username_len == 0 {
        return Err(AppError::validation("\"username\" is required"));
    }
    if username_len < USERNAME_MIN_LEN {
        return Err(AppError::validation(format!(
            "\"username\" length must be at least {} characters long",
            USERNAME_MIN_LEN
        )));
    }
    if username_len > USERNAME_MAX_LEN {
        return Err(AppError::validation(format!(
            "\"username\" length must be less than or equal to {} characters long",
            USERNAME_MAX_LEN
        )));
    }

    validate_login(email, password)
}

pub fn validate_login(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::validation("\"email\" is required"));
    }
    if !is_valid_email(email.trim()) {
        return Err(AppError::validation("\"email\" must be a valid email"));
    }
    if password.is_empty() {
        return Err(AppError::validation("\"password\" is required"));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::validation(format!(
            "\"password\" length must be at least {} characters long",
            PASSWORD_MIN_LEN
        )));
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and a dotted domain
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}
