// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Role-based permission evaluation.
//!
//! The matrix is explicit: each role lists every permission it holds and
//! nothing is inherited from another role. Unknown permission strings
//! always evaluate to `false`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Account role as reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Developer,
    Subscriber,
    Unauthenticated,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::Developer,
        Role::Subscriber,
        Role::Unauthenticated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Developer => "developer",
            Self::Subscriber => "subscriber",
            Self::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether accounts with this role may hold an interactive session.
    pub fn may_hold_session(&self) -> bool {
        matches!(self, Self::Admin | Self::Developer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a role string that names no known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "developer" => Ok(Self::Developer),
            "subscriber" => Ok(Self::Subscriber),
            "unauthenticated" => Ok(Self::Unauthenticated),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Closed set of permission tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    ReadUsers,
    WriteUsers,
    ReadContent,
    WriteContent,
    PublishContent,
    ModerateComments,
    ReadDonations,
    WriteDonations,
    ReadGoals,
    WriteGoals,
    ReadPrayerRequests,
    ModeratePrayerRequests,
    ReadSubscribers,
    WriteSubscribers,
    SubmitDonation,
    SubmitPrayerRequest,
    ManageSubscription,
    AdminSettings,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::ReadUsers,
        Permission::WriteUsers,
        Permission::ReadContent,
        Permission::WriteContent,
        Permission::PublishContent,
        Permission::ModerateComments,
        Permission::ReadDonations,
        Permission::WriteDonations,
        Permission::ReadGoals,
        Permission::WriteGoals,
        Permission::ReadPrayerRequests,
        Permission::ModeratePrayerRequests,
        Permission::ReadSubscribers,
        Permission::WriteSubscribers,
        Permission::SubmitDonation,
        Permission::SubmitPrayerRequest,
        Permission::ManageSubscription,
        Permission::AdminSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadUsers => "read:users",
            Self::WriteUsers => "write:users",
            Self::ReadContent => "read:content",
            Self::WriteContent => "write:content",
            Self::PublishContent => "publish:content",
            Self::ModerateComments => "moderate:comments",
            Self::ReadDonations => "read:donations",
            Self::WriteDonations => "write:donations",
            Self::ReadGoals => "read:goals",
            Self::WriteGoals => "write:goals",
            Self::ReadPrayerRequests => "read:prayer-requests",
            Self::ModeratePrayerRequests => "moderate:prayer-requests",
            Self::ReadSubscribers => "read:subscribers",
            Self::WriteSubscribers => "write:subscribers",
            Self::SubmitDonation => "submit:donation",
            Self::SubmitPrayerRequest => "submit:prayer-request",
            Self::ManageSubscription => "manage:subscription",
            Self::AdminSettings => "admin:settings",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a permission string that names no known tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

impl TryFrom<String> for Permission {
    type Error = UnknownPermission;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.as_str().to_string()
    }
}

/// Static role → permission table.
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl PermissionMatrix {
    /// Build a matrix from explicit grants and validate it.
    pub fn new(grants: HashMap<Role, HashSet<Permission>>) -> Result<Self, ConfigError> {
        let matrix = Self { grants };
        matrix.validate()?;
        Ok(matrix)
    }

    /// The application's built-in matrix.
    pub fn standard() -> Self {
        use Permission::*;

        let admin: &[Permission] = &Permission::ALL;
        let developer: &[Permission] = &[
            ReadUsers,
            ReadContent,
            WriteContent,
            PublishContent,
            ModerateComments,
            ReadDonations,
            ReadGoals,
            WriteGoals,
            ReadPrayerRequests,
            ModeratePrayerRequests,
            ReadSubscribers,
        ];
        let subscriber: &[Permission] = &[
            ReadContent,
            SubmitDonation,
            SubmitPrayerRequest,
            ManageSubscription,
        ];
        let unauthenticated: &[Permission] = &[ReadContent, SubmitDonation, SubmitPrayerRequest];

        let grants = [
            (Role::Admin, admin),
            (Role::Developer, developer),
            (Role::Subscriber, subscriber),
            (Role::Unauthenticated, unauthenticated),
        ]
        .into_iter()
        .map(|(role, perms)| (role, perms.iter().copied().collect()))
        .collect();

        Self { grants }
    }

    /// Every role must hold at least one permission and every tag must be
    /// granted somewhere.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in Role::ALL {
            if self.grants.get(&role).map_or(true, HashSet::is_empty) {
                return Err(ConfigError::EmptyRole(role.to_string()));
            }
        }

        for permission in Permission::ALL {
            if !self.grants.values().any(|set| set.contains(&permission)) {
                return Err(ConfigError::UnusedPermission(permission.to_string()));
            }
        }

        Ok(())
    }

    /// Typed check.
    pub fn allows(&self, role: Role, permission: Permission) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|set| set.contains(&permission))
    }

    /// String check; unknown permission strings are denied.
    pub fn has_permission(&self, role: Role, permission: &str) -> bool {
        match permission.parse::<Permission>() {
            Ok(p) => self.allows(role, p),
            Err(_) => false,
        }
    }

    /// Permissions held by `role`, sorted by tag.
    pub fn permissions_for(&self, role: Role) -> Vec<Permission> {
        let mut perms: Vec<Permission> = self
            .grants
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        perms.sort_by_key(|p| p.as_str());
        perms
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::standard()
    }
}
