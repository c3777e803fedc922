/// Fixed credential list. Placeholder authentication, kept deliberately
/// simple: a matching username is the whole session.
const USERS: &[(&str, &str)] = &[
    ("alpha", "1234"),
    ("beta", "1234"),
    ("gamma", "1234"),
    ("admin", "admin"),
];

pub fn verify_credentials(username: &str, password: &str) -> bool {
    USERS
        .iter()
        .any(|(u, p)| *u == username && *p == password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_account_passes() {
        assert!(verify_credentials("alpha", "1234"));
        assert!(verify_credentials("admin", "admin"));
    }

    #[test]
    fn wrong_password_fails() {
        assert!(!verify_credentials("alpha", "admin"));
        assert!(!verify_credentials("nobody", "1234"));
    }
}
