//! The authenticated principal and its role.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const STUDENT_DASHBOARD: &str = "/etudiant/dashboard";
pub const INSTRUCTOR_DASHBOARD: &str = "/formateur/dashboard";
pub const ADMIN_DASHBOARD: &str = "/admin/dashboard";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Etudiant,
    Formateur,
    Admin,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Etudiant, Self::Formateur, Self::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Etudiant => "ETUDIANT",
            Self::Formateur => "FORMATEUR",
            Self::Admin => "ADMIN",
        }
    }

    /// Default view a user of this role lands on.
    #[must_use]
    pub const fn landing_route(self) -> &'static str {
        match self {
            Self::Etudiant => STUDENT_DASHBOARD,
            Self::Formateur => INSTRUCTOR_DASHBOARD,
            Self::Admin => ADMIN_DASHBOARD,
        }
    }

    /// Parses a role name, case-insensitive.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "ETUDIANT" => Some(Self::Etudiant),
            "FORMATEUR" => Some(Self::Formateur),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Opaque user identifier; the backend hands out numbers, imported records may
/// carry strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(formatter, "{id}"),
            Self::Text(id) => formatter.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Keys of the modeled identity fields; they can never appear in `extra`.
pub const IDENTITY_FIELDS: &[&str] = &[
    "id",
    "email",
    "nom",
    "prenom",
    "role",
    "matricule",
    "specialite",
];

/// Identity record persisted under the `user` key. Fields not modeled here are
/// kept in `extra` so a stored record survives a read/write cycle unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub prenom: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialite: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl UserIdentity {
    #[must_use]
    pub fn new(id: impl Into<UserId>, role: Role, nom: &str, prenom: &str) -> Self {
        Self {
            id: id.into(),
            email: None,
            nom: nom.to_string(),
            prenom: prenom.to_string(),
            role,
            matricule: None,
            specialite: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    #[must_use]
    pub fn with_matricule(mut self, matricule: &str) -> Self {
        self.matricule = Some(matricule.to_string());
        self
    }

    #[must_use]
    pub fn with_specialite(mut self, specialite: &str) -> Self {
        self.specialite = Some(specialite.to_string());
        self
    }

    /// Adds an unmodeled field. Keys naming a modeled field are ignored, so
    /// the stored record never carries the same key twice.
    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert_extra(key, value);
        self
    }

    /// Returns `false` when `key` names a modeled field and was ignored.
    pub fn insert_extra(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if IDENTITY_FIELDS.contains(&key) {
            return false;
        }
        self.extra.insert(key.to_string(), value.into());
        true
    }

    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Accounts offered by the development login screen.
    #[must_use]
    pub fn demo(role: Role) -> Self {
        match role {
            Role::Etudiant => Self::new(1, role, "Durand", "Pierre")
                .with_email("etudiant1@school.com")
                .with_matricule("ETU001"),
            Role::Formateur => Self::new(2, role, "Martin", "Pierre")
                .with_email("formateur2@school.com")
                .with_specialite("Informatique"),
            Role::Admin => Self::new(3, role, "Bernard", "Claire").with_email("admin@school.com"),
        }
    }

    /// `"<prenom> <nom>"`, without stray whitespace when either is missing.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.prenom.trim(), self.nom.trim())
            .trim()
            .to_string()
    }
}
