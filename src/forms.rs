// SPDX-License-Identifier: Apache-2.0
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_TITLE_CHARS: usize = 100;
pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

/// Collects validation failures for one form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    pub field_errors: BTreeMap<String, String>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Records `message` for `key` unless the field already has an error.
    pub fn add_field_error(&mut self, key: &str, message: &str) {
        self.field_errors
            .entry(key.to_owned())
            .or_insert_with(|| message.to_owned());
    }

    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_owned());
    }

    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: i64,
    #[serde(skip)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
            validator: Validator::default(),
        }
    }
}

impl SnippetCreateForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, MAX_TITLE_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.valid()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(skip)]
    pub validator: Validator,
}

impl UserSignupForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", "This field cannot be blank");
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.check_field(
            min_chars(&self.password, MIN_PASSWORD_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v.valid()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(skip)]
    pub validator: Validator,
}

impl UserLoginForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.valid()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPasswordUpdateForm {
    #[serde(default, rename = "currentPassword")]
    pub current_password: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
    #[serde(default, rename = "newPasswordConfirmation")]
    pub new_password_confirmation: String,
    #[serde(skip)]
    pub validator: Validator,
}

impl AccountPasswordUpdateForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(
            not_blank(&self.current_password),
            "currentPassword",
            "This field cannot be blank",
        );
        v.check_field(
            not_blank(&self.new_password),
            "newPassword",
            "This field cannot be blank",
        );
        v.check_field(
            min_chars(&self.new_password, MIN_PASSWORD_CHARS),
            "newPassword",
            "This field must be at least 8 characters long",
        );
        v.check_field(
            not_blank(&self.new_password_confirmation),
            "newPasswordConfirmation",
            "This field cannot be blank",
        );
        v.check_field(
            self.new_password == self.new_password_confirmation,
            "newPasswordConfirmation",
            "Passwords do not match",
        );
        v.valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern() {
        assert!(matches("bob@example.com", &EMAIL_RX));
        assert!(!matches("bob@example.", &EMAIL_RX));
        assert!(!matches("bob", &EMAIL_RX));
        assert!(!matches("", &EMAIL_RX));
    }

    #[test]
    fn character_limits_count_chars_not_bytes() {
        assert!(max_chars("ééé", 3));
        assert!(!max_chars("éééé", 3));
        assert!(min_chars("pa$$word", 8));
        assert!(!min_chars("pa$$", 8));
    }

    #[test]
    fn first_error_per_field_wins() {
        let mut form = UserSignupForm {
            name: "Bob".into(),
            email: "".into(),
            password: "validPassw0rd".into(),
            ..Default::default()
        };

        assert!(!form.validate());
        assert_eq!(form.validator.field_error("email"), Some("This field cannot be blank"));
        assert_eq!(form.validator.field_error("name"), None);
    }

    #[test]
    fn snippet_expiry_must_be_permitted() {
        let mut form = SnippetCreateForm {
            title: "t".into(),
            content: "c".into(),
            expires: 30,
            ..Default::default()
        };
        assert!(!form.validate());
        assert!(form.validator.field_error("expires").is_some());

        let mut form = SnippetCreateForm {
            title: "t".into(),
            content: "c".into(),
            ..Default::default()
        };
        assert!(form.validate());
    }

    #[test]
    fn password_confirmation_must_match() {
        let mut form = AccountPasswordUpdateForm {
            current_password: "pa$$word".into(),
            new_password: "newpa$$word".into(),
            new_password_confirmation: "different1".into(),
            ..Default::default()
        };
        assert!(!form.validate());
        assert_eq!(
            form.validator.field_error("newPasswordConfirmation"),
            Some("Passwords do not match")
        );
    }
}
