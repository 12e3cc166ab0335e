//! Password hashing, verification and strength policy

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::derive::Display;
use std::{str::FromStr, sync::LazyLock};
use thiserror::Error;
use zxcvbn::{zxcvbn, Score};

static DEFAULT_HASHER: LazyLock<Argon2<'static>> = LazyLock::new(Argon2::default);

/// Hash of the empty password, checked against when the user does not exist
/// so that unknown usernames take as long as wrong passwords
static EMPTY_HASH: LazyLock<Option<PWHash>> = LazyLock::new(|| hash("").ok());

const MIN_SCORE: Score = Score::Three;

/// A hashed password in PHC string form
#[derive(Clone, Debug, Display)]
pub struct PWHash(PasswordHashString);

impl PWHash {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for PWHash {
    type Err = argon2::password_hash::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PasswordHashString::from_str(s).map(PWHash)
    }
}

#[derive(Debug, Error)]
pub enum WeakPassword {
    #[error("password must be between 9 and 63 characters")]
    Length,
    #[error("password must differ from the username")]
    SameAsUsername,
    #[error("password is too easy to guess")]
    Guessable,
}

/// Hashes a clear-text password with Argon2id and a random salt
pub fn hash(password: &str) -> Result<PWHash, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = DEFAULT_HASHER
        .hash_password(password.as_bytes(), &salt)?
        .serialize();

    Ok(PWHash(hash))
}

/// Checks a password against the stored hash.
///
/// When no hash is given the password is still checked against a dummy
/// hash, so the caller cannot tell unknown users from bad passwords by timing.
pub fn verify(password: &str, maybe_hash: Option<&PWHash>) -> bool {
    let Some(hash) = maybe_hash.or(EMPTY_HASH.as_ref()) else {
        return false;
    };

    let verified = DEFAULT_HASHER
        .verify_password(password.as_bytes(), &hash.0.password_hash())
        .is_ok();

    verified && maybe_hash.is_some()
}

/// Password policy for new accounts
pub fn check_strength(password: &str, username: &str) -> Result<(), WeakPassword> {
    if password.eq_ignore_ascii_case(username) {
        return Err(WeakPassword::SameAsUsername);
    }

    if password.len() <= 8 || password.len() >= 64 {
        return Err(WeakPassword::Length);
    }

    if zxcvbn(password, &[username]).score() < MIN_SCORE {
        return Err(WeakPassword::Guessable);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash("Triage-Desk-2024!").unwrap();
        assert!(verify("Triage-Desk-2024!", Some(&hashed)));
        assert!(!verify("triage-desk-2024!", Some(&hashed)));
    }

    #[test]
    fn test_unknown_user_never_verifies() {
        assert!(!verify("", None));
        assert!(!verify("anything", None));
    }

    #[test]
    fn test_hash_round_trips_through_phc_string() {
        let hashed = hash("Ambulance#Kilo9").unwrap();
        let parsed: PWHash = hashed.as_str().parse().unwrap();
        assert!(verify("Ambulance#Kilo9", Some(&parsed)));
    }

    #[test]
    fn test_password_strength_levels() {
        let username = "nurse_joy";
        let cases = [
            ("short", false),
            ("password123", false),
            ("abcdefghijklm", false),
            ("StrongP@ssw0rd!", true),
            ("Tr0ub4dour&3!", true),
        ];

        for (password, expected) in cases {
            assert_eq!(
                check_strength(password, username).is_ok(),
                expected,
                "Password '{}' validation result was unexpected",
                password
            );
        }
    }

    #[test]
    fn test_password_same_as_username() {
        assert!(matches!(
            check_strength("Nurse_Joy", "nurse_joy"),
            Err(WeakPassword::SameAsUsername)
        ));
    }

    #[test]
    fn test_password_length_boundaries() {
        assert!(matches!(check_strength("Xk7#pQ2", "someone"), Err(WeakPassword::Length)));
        let long = "Zq9!".repeat(17);
        assert!(matches!(check_strength(&long, "someone"), Err(WeakPassword::Length)));
    }
}
