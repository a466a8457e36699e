/// Tenant identifiers and database names
///
/// Tenant ids look like `tenant_1735689600000_k3j9x0a2b` and generated
/// database names like `tenant_T-001_1735689600000_p0q8r7s6t`: a millisecond
/// timestamp followed by nine lowercase base-36 characters.
///
/// Database names end up inside DDL (`CREATE DATABASE`, `GRANT`), which cannot
/// take bind parameters, so every name is validated and backtick-quoted by
/// [`quote_identifier`] before it reaches SQL.

use crate::error::TenantError;
use chrono::Utc;
use rand::Rng;

/// MySQL identifier length limit
pub const MAX_DATABASE_NAME_LEN: usize = 64;

/// Schemas owned by the server itself
pub const SYSTEM_SCHEMAS: &[&str] = &["mysql", "sys", "performance_schema", "information_schema"];

const SUFFIX_LEN: usize = 9;
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Generates a new tenant id
pub fn generate_tenant_id() -> String {
    format!("tenant_{}_{}", Utc::now().timestamp_millis(), random_suffix())
}

/// Generates a database name for a seller tax identifier
///
/// Characters outside `[A-Za-z0-9_-]` are replaced with `_`, and the tax
/// identifier part is shortened if the name would exceed 64 characters.
pub fn generate_database_name(tax_id: &str) -> String {
    let tail = format!("_{}_{}", Utc::now().timestamp_millis(), random_suffix());
    let budget = MAX_DATABASE_NAME_LEN - "tenant_".len() - tail.len();

    let tax_part: String = tax_id
        .chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .take(budget)
        .collect();

    format!("tenant_{}{}", tax_part, tail)
}

/// Checks that a database name is safe to use as an identifier
///
/// # Errors
///
/// [`TenantError::Validation`] when the name is empty, longer than 64
/// characters, or contains anything outside `[A-Za-z0-9_-]`.
pub fn validate_database_name(name: &str) -> Result<(), TenantError> {
    if name.is_empty() {
        return Err(TenantError::Validation(
            "database name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(TenantError::Validation(format!(
            "database name `{}` is longer than {} characters",
            name, MAX_DATABASE_NAME_LEN
        )));
    }

    if let Some(bad) = name.chars().find(|c| !is_allowed(*c)) {
        return Err(TenantError::Validation(format!(
            "database name `{}` contains invalid character {:?}",
            name, bad
        )));
    }

    Ok(())
}

/// Checks that a name is usable as a tenant database
///
/// On top of [`validate_database_name`], rejects the server's own schemas and
/// the master database. The comparison ignores case, since MySQL folds schema
/// names on case-insensitive filesystems.
pub fn ensure_tenant_database_name(name: &str, master_database: &str) -> Result<(), TenantError> {
    validate_database_name(name)?;

    let reserved = name.eq_ignore_ascii_case(master_database)
        || SYSTEM_SCHEMAS.iter().any(|s| name.eq_ignore_ascii_case(s));

    if reserved {
        return Err(TenantError::Validation(format!(
            "database name `{}` is reserved",
            name
        )));
    }

    Ok(())
}

/// Validates and backtick-quotes a database name for DDL
pub fn quote_identifier(name: &str) -> Result<String, TenantError> {
    validate_database_name(name)?;
    Ok(format!("`{}`", name))
}

/// Quotes an account name as a MySQL string literal (`'user'`)
pub fn quote_account(user: &str) -> String {
    format!("'{}'", user.replace('\\', "\\\\").replace('\'', "''"))
}
