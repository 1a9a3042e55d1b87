//! Password authentication methods.

pub mod scram;

pub use scram::ScramClient;

use std::fmt::Write;

/// `md5` followed by `md5(md5(password + user) + salt)` in hex.
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = md5::compute(format!("{}{}", password, user));
    let mut outer_input = format!("{:x}", inner).into_bytes();
    outer_input.extend_from_slice(&salt);
    let mut out = String::with_capacity(35);
    out.push_str("md5");
    let _ = write!(out, "{:x}", md5::compute(outer_input));
    out
}
