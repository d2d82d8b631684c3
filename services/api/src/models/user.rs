//! User models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{
    Validate, ValidationError, normalize_email, required, username_from_email, validate_name,
    validate_password, validate_username,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::Admin => "ADMIN",
            UserRole::User => "USER",
        }
    }
}

impl FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SUPER_ADMIN" => Ok(UserRole::SuperAdmin),
            "ADMIN" => Ok(UserRole::Admin),
            "USER" => Ok(UserRole::User),
            _ => Err(ValidationError::new(
                "role",
                "must be one of SUPER_ADMIN, ADMIN, USER",
            )),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Banned,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Banned => "BANNED",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            "BANNED" => Ok(UserStatus::Banned),
            _ => Err(ValidationError::new(
                "status",
                "must be one of ACTIVE, INACTIVE, BANNED",
            )),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored user, password hash included
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub avatar: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            avatar: user.avatar,
            role: user.role,
            status: user.status,
            create_at: user.create_at,
            update_at: user.update_at,
        }
    }
}

/// Request for user registration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub status: Option<String>,
}

/// A checked registration; `password` is still plain text here
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl Validate for CreateUserRequest {
    type Valid = NewUser;

    fn validate(self) -> Result<NewUser, ValidationError> {
        let email = normalize_email(&required("email", self.email)?)?;
        let password = required("password", self.password)?;
        validate_password(&password)?;

        let first_name = required("first_name", self.first_name)?.trim().to_string();
        validate_name("first_name", &first_name)?;
        let last_name = required("last_name", self.last_name)?.trim().to_string();
        validate_name("last_name", &last_name)?;

        let username = match self.username.map(|u| u.trim().to_string()) {
            Some(username) if !username.is_empty() => username,
            _ => username_from_email(&email),
        };
        validate_username(&username)?;

        let status = match self.status.as_deref() {
            Some(status) => status.parse()?,
            None => UserStatus::default(),
        };

        Ok(NewUser {
            username,
            email,
            first_name,
            last_name,
            password,
            role: UserRole::default(),
            status,
        })
    }
}

/// Profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == UserPatch::default()
    }
}

impl Validate for UpdateUserRequest {
    type Valid = UserPatch;

    fn validate(self) -> Result<UserPatch, ValidationError> {
        let username = self.username.map(|u| u.trim().to_string());
        if let Some(username) = username.as_deref() {
            validate_username(username)?;
        }
        let first_name = self.first_name.map(|n| n.trim().to_string());
        if let Some(name) = first_name.as_deref() {
            if name.is_empty() {
                return Err(ValidationError::new("first_name", "should not be empty"));
            }
            validate_name("first_name", name)?;
        }
        let last_name = self.last_name.map(|n| n.trim().to_string());
        if let Some(name) = last_name.as_deref() {
            if name.is_empty() {
                return Err(ValidationError::new("last_name", "should not be empty"));
            }
            validate_name("last_name", name)?;
        }
        let status: Option<UserStatus> = self.status.as_deref().map(str::parse).transpose()?;
        let role: Option<UserRole> = self.role.as_deref().map(str::parse).transpose()?;

        let patch = UserPatch {
            username,
            first_name,
            last_name,
            avatar: self.avatar,
            status,
            role,
        };
        if patch.is_empty() {
            return Err(ValidationError::new("body", "should contain at least one field"));
        }
        Ok(patch)
    }
}
