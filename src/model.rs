//! Backend records as the REST API sends them. Field names stay English on the
//! Rust side and map to the Spanish wire names through `rename`.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Groups hold at most this many students.
pub const GROUP_CAPACITY: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[serde(rename = "idPersona")]
    pub id: Option<i64>,
    #[serde(rename = "documento")]
    pub document: Option<String>,
    #[serde(rename = "nombre")]
    pub first_name: Option<String>,
    #[serde(rename = "apellido")]
    pub last_name: Option<String>,
    #[serde(rename = "fechaDeNacimiento")]
    pub birth_date: Option<String>,
    #[serde(rename = "genero")]
    pub gender: Option<String>,
}

impl Person {
    pub fn full_name(&self) -> String {
        let parts = [self.first_name.as_deref(), self.last_name.as_deref()];
        parts
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grade {
    #[serde(rename = "idGrado")]
    pub id: Option<i64>,
    #[serde(rename = "nombreGrado")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Teacher {
    #[serde(rename = "idProfesor")]
    pub id: Option<i64>,
    pub persona: Option<Person>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    #[serde(rename = "idGrupo")]
    pub id: Option<i64>,
    #[serde(rename = "numeroGrupo")]
    pub number: Option<i64>,
    #[serde(rename = "directorGrupo")]
    pub director: Option<Teacher>,
    #[serde(rename = "grado")]
    pub grade: Option<Grade>,
    #[serde(rename = "numeroEstudiantes")]
    pub student_count: Option<u32>,
}

impl Group {
    pub fn grade_name(&self) -> String {
        self.grade
            .as_ref()
            .and_then(|g| g.name.clone())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn count(&self) -> u32 {
        self.student_count.unwrap_or(0)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= GROUP_CAPACITY
    }

    pub fn occupancy_percent(&self) -> u32 {
        ((self.count() as f64 / GROUP_CAPACITY as f64) * 100.0).round() as u32
    }

    /// Option text used by the assignment selector.
    pub fn option_label(&self) -> String {
        format!(
            "Grupo {} ({}/{} estudiantes)",
            self.number.unwrap_or_default(),
            self.count(),
            GROUP_CAPACITY
        )
    }

    pub fn director_name(&self) -> Option<String> {
        self.director
            .as_ref()
            .and_then(|d| d.persona.as_ref())
            .map(Person::full_name)
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardian {
    #[serde(rename = "idAcudiente")]
    pub id: Option<i64>,
    pub persona: Option<Person>,
    #[serde(rename = "correoElectronico")]
    pub email: Option<String>,
    #[serde(rename = "estado")]
    pub state: Option<String>,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Student {
    #[serde(rename = "codigoEstudiante")]
    pub code: Option<i64>,
    pub persona: Option<Person>,
    #[serde(rename = "acudiente")]
    pub guardian: Option<Guardian>,
    #[serde(rename = "grupo")]
    pub group: Option<Group>,
    #[serde(rename = "estado")]
    pub state: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        self.persona
            .as_ref()
            .map(Person::full_name)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.state.as_deref() == Some("Activo")
    }

    pub fn has_group(&self) -> bool {
        self.group.is_some()
    }

    pub fn group_label(&self) -> String {
        match &self.group {
            Some(g) => format!("{} - Grupo {}", g.grade_name(), g.number.unwrap_or_default()),
            None => "Sin grupo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Psicosociales,
    Academicos,
    Deportivos,
    Artisticos,
    Culturales,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Psicosociales,
        Category::Academicos,
        Category::Deportivos,
        Category::Artisticos,
        Category::Culturales,
    ];

    pub fn parse(raw: &str) -> Option<Category> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == raw.trim().to_lowercase())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Psicosociales => "psicosociales",
            Category::Academicos => "academicos",
            Category::Deportivos => "deportivos",
            Category::Artisticos => "artisticos",
            Category::Culturales => "culturales",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Psicosociales => "Psicosociales",
            Category::Academicos => "Académicos",
            Category::Deportivos => "Deportivos",
            Category::Artisticos => "Artísticos",
            Category::Culturales => "Culturales",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Achievement {
    #[serde(rename = "idLogro")]
    pub id: Option<i64>,
    #[serde(rename = "nombreLogro")]
    pub name: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "categoria")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Period {
    #[serde(rename = "idPeriodo")]
    pub id: Option<i64>,
    #[serde(rename = "nombrePeriodo")]
    pub name: Option<String>,
    #[serde(rename = "fechaInicio")]
    pub starts: Option<String>,
    #[serde(rename = "fechaFin")]
    pub ends: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeAssignment {
    #[serde(rename = "idCalificacion")]
    pub id: Option<i64>,
    #[serde(rename = "estudiante")]
    pub student: Option<Student>,
    #[serde(rename = "logro")]
    pub achievement: Option<Achievement>,
    #[serde(rename = "periodo")]
    pub period: Option<Period>,
    #[serde(rename = "profesor")]
    pub teacher: Option<Teacher>,
    #[serde(rename = "fechaAsignacion")]
    pub assigned_at: Option<String>,
}

impl GradeAssignment {
    pub fn period_id(&self) -> Option<i64> {
        self.period.as_ref().and_then(|p| p.id)
    }

    pub fn achievement_id(&self) -> Option<i64> {
        self.achievement.as_ref().and_then(|l| l.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeHistory {
    #[serde(rename = "estudiante")]
    pub student: Option<Student>,
    #[serde(rename = "calificaciones")]
    pub assignments: Vec<GradeAssignment>,
    #[serde(rename = "totalLogros")]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    #[serde(rename = "idObservacion")]
    pub id: Option<i64>,
    #[serde(rename = "titulo")]
    pub title: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preenrollment {
    #[serde(rename = "idPreinscripcion")]
    pub id: Option<i64>,
    #[serde(rename = "aspirante")]
    pub applicant: Option<Student>,
    #[serde(rename = "fechaEntrevista")]
    pub interview_at: Option<String>,
    #[serde(rename = "lugarEntrevista")]
    pub interview_place: Option<String>,
    #[serde(rename = "fechaPreinscripcion")]
    pub submitted_at: Option<String>,
    #[serde(rename = "acudiente")]
    pub guardian: Option<Guardian>,
}

impl Preenrollment {
    pub fn state(&self) -> String {
        self.applicant
            .as_ref()
            .and_then(|a| a.state.clone())
            .unwrap_or_else(|| "Pendiente".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAccount {
    #[serde(rename = "idTokenUsuario")]
    pub id: Option<i64>,
    #[serde(rename = "nombreUsuario")]
    pub user_name: Option<String>,
    #[serde(rename = "estado")]
    pub active: Option<bool>,
    pub persona: Option<Person>,
    #[serde(rename = "rol")]
    pub role: Option<String>,
}

impl UserAccount {
    pub fn full_name(&self) -> String {
        self.persona
            .as_ref()
            .map(Person::full_name)
            .unwrap_or_default()
    }
}

/// CSS class the shell uses for a pre-enrollment state badge.
pub fn state_class(state: &str) -> &'static str {
    match state.trim().to_lowercase().as_str() {
        "pendiente" => "estado-pendiente",
        "aprobado" => "estado-aprobado",
        "rechazado" => "estado-rechazado",
        "en revisión" | "en revision" => "estado-revision",
        // Approved applicants are stored as active students.
        "activo" => "estado-aprobado",
        _ => "estado-pendiente",
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]`.
pub fn parse_backend_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Day/month/year the way the screens print dates.
pub fn display_date(raw: Option<&str>) -> Option<String> {
    let d = parse_backend_date(raw?)?;
    Some(format!("{}/{}/{}", d.day(), d.month(), d.year()))
}

/// Backend date-times for a bare date, e.g. `2012-03-04T00:00:00`.
pub fn date_to_backend(raw: &str) -> Option<String> {
    let d = parse_backend_date(raw)?;
    Some(format!("{}T00:00:00", d.format("%Y-%m-%d")))
}
