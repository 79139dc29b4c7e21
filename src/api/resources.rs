//! Endpoints of the school backend. Bodies come back as raw JSON; how they
//! are displayed is up to the caller.

use super::client::ApiClient;
use super::errors::ApiError;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Courses,
    Students,
    Groups,
    Specialties,
    Sessions,
    Grades,
}

impl Resource {
    pub const ALL: [Self; 6] = [
        Self::Courses,
        Self::Students,
        Self::Groups,
        Self::Specialties,
        Self::Sessions,
        Self::Grades,
    ];

    /// Collection path on the backend.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Courses => "/cours",
            Self::Students => "/etudiants",
            Self::Groups => "/groupes",
            Self::Specialties => "/specialites",
            Self::Sessions => "/seances-cours",
            Self::Grades => "/notes",
        }
    }

    /// Accepts the backend collection names as well as English aliases.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cours" | "courses" => Some(Self::Courses),
            "etudiants" | "students" => Some(Self::Students),
            "groupes" | "groups" => Some(Self::Groups),
            "specialites" | "specialties" => Some(Self::Specialties),
            "seances-cours" | "seances" | "sessions" => Some(Self::Sessions),
            "notes" | "grades" => Some(Self::Grades),
            _ => None,
        }
    }

    /// Path for `lookup` on this collection, or the collection itself.
    ///
    /// # Errors
    /// Returns [`ApiError::Config`] when the collection has no such lookup.
    pub fn path(self, lookup: Option<&Lookup>) -> Result<String, ApiError> {
        let base = self.collection();
        let Some(lookup) = lookup else {
            return Ok(base.to_string());
        };

        let path = match (self, lookup) {
            (_, Lookup::Id(id)) => format!("{base}/{}", segment(id)),
            (Self::Courses | Self::Groups | Self::Specialties, Lookup::Code(code)) => {
                format!("{base}/code/{}", segment(code))
            }
            (Self::Courses | Self::Sessions, Lookup::Instructor(id)) => {
                format!("{base}/formateur/{}", segment(id))
            }
            (Self::Courses | Self::Students, Lookup::Specialty(id)) => {
                format!("{base}/specialite/{}", segment(id))
            }
            (Self::Students, Lookup::Matricule(matricule)) => {
                format!("{base}/matricule/{}", segment(matricule))
            }
            (Self::Students, Lookup::Group(id)) => format!("{base}/groupe/{}", segment(id)),
            (Self::Students, Lookup::Email(email)) => format!("{base}/email/{}", segment(email)),
            (Self::Sessions | Self::Grades, Lookup::Course(id)) => {
                format!("{base}/cours/{}", segment(id))
            }
            (Self::Grades, Lookup::Student(id)) => format!("{base}/etudiant/{}", segment(id)),
            (Self::Groups | Self::Specialties, Lookup::StudentsOf(id)) => {
                format!("{base}/{}/etudiants", segment(id))
            }
            (Self::Specialties, Lookup::CoursesOf(id)) => format!("{base}/{}/cours", segment(id)),
            (Self::Sessions, Lookup::Upcoming) => format!("{base}/a-venir"),
            (Self::Grades, Lookup::Mine) => format!("{base}/mes-notes"),
            _ => {
                return Err(ApiError::Config(format!(
                    "{self} cannot be looked up by {}",
                    lookup.name()
                )))
            }
        };
        Ok(path)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.collection().trim_start_matches('/'))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Id(String),
    Code(String),
    Instructor(String),
    Specialty(String),
    Matricule(String),
    Group(String),
    Email(String),
    Course(String),
    Student(String),
    /// Students belonging to a group or specialty.
    StudentsOf(String),
    /// Courses of a specialty.
    CoursesOf(String),
    Upcoming,
    /// Grades of the signed-in student.
    Mine,
}

impl Lookup {
    /// Parses a CLI filter name and its value.
    ///
    /// # Errors
    /// Returns a message when the filter is unknown or its value is missing.
    pub fn parse(filter: &str, value: Option<&str>) -> Result<Self, String> {
        let filter = filter.trim().to_lowercase();
        match filter.as_str() {
            "a-venir" | "upcoming" => return Ok(Self::Upcoming),
            "mes-notes" | "mine" => return Ok(Self::Mine),
            _ => {}
        }

        let value = value
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| format!("filter '{filter}' needs a value"))?
            .to_string();

        match filter.as_str() {
            "id" => Ok(Self::Id(value)),
            "code" => Ok(Self::Code(value)),
            "formateur" | "instructor" => Ok(Self::Instructor(value)),
            "specialite" | "specialty" => Ok(Self::Specialty(value)),
            "matricule" => Ok(Self::Matricule(value)),
            "groupe" | "group" => Ok(Self::Group(value)),
            "email" => Ok(Self::Email(value)),
            "cours" | "course" => Ok(Self::Course(value)),
            "etudiant" | "student" => Ok(Self::Student(value)),
            "etudiants-de" | "students-of" => Ok(Self::StudentsOf(value)),
            "cours-de" | "courses-of" => Ok(Self::CoursesOf(value)),
            _ => Err(format!("unknown filter '{filter}'")),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::Code(_) => "code",
            Self::Instructor(_) => "formateur",
            Self::Specialty(_) => "specialite",
            Self::Matricule(_) => "matricule",
            Self::Group(_) => "groupe",
            Self::Email(_) => "email",
            Self::Course(_) => "cours",
            Self::Student(_) => "etudiant",
            Self::StudentsOf(_) => "etudiants-de",
            Self::CoursesOf(_) => "cours-de",
            Self::Upcoming => "a-venir",
            Self::Mine => "mes-notes",
        }
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl ApiClient {
    /// Whole collection.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body is not JSON.
    pub async fn list(&self, resource: Resource) -> Result<Value, ApiError> {
        self.get_json(&resource.path(None)?).await
    }

    /// Single record or filtered sub-collection.
    ///
    /// # Errors
    /// Returns an error if the lookup is not supported by `resource`, the
    /// request fails, or the body is not JSON.
    pub async fn find(&self, resource: Resource, lookup: &Lookup) -> Result<Value, ApiError> {
        self.get_json(&resource.path(Some(lookup))?).await
    }
}
