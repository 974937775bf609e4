//! Public admission request. The backend has no combined endpoint, so the
//! request is five creates in a row; a failure stops the chain and reports
//! what was already stored.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, Method};
use crate::model;

pub const SUCCESS: &str = "¡Solicitud registrada con éxito!";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonFields {
    pub document: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `YYYY-MM-DD` from the date input.
    pub birth_date: Option<String>,
    pub gender: Option<String>,
}

impl PersonFields {
    fn body(&self, birth: &str) -> Value {
        let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();
        json!({
            "documento": text(&self.document),
            "nombre": text(&self.first_name),
            "apellido": text(&self.last_name),
            "fechaDeNacimiento": birth,
            "genero": text(&self.gender),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionForm {
    pub guardian: PersonFields,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub applicant: PersonFields,
}

/// A record the chain stored before it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub kind: &'static str,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReceipt {
    pub guardian_person_id: i64,
    pub applicant_person_id: i64,
    pub guardian_id: i64,
    pub student_code: i64,
    pub preenrollment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Por favor seleccione las fechas de nacimiento.")]
    MissingBirthDate,
    #[error("{step}: {message}")]
    Step {
        step: &'static str,
        message: String,
        created: Vec<Created>,
    },
}

impl AdmissionError {
    pub fn created(&self) -> &[Created] {
        match self {
            AdmissionError::Step { created, .. } => created,
            AdmissionError::MissingBirthDate => &[],
        }
    }
}

struct Chain<'a> {
    api: &'a ApiClient,
    created: Vec<Created>,
}

impl Chain<'_> {
    /// Posts one record and pulls its id out of the reply.
    fn create(
        &mut self,
        step: &'static str,
        path: &str,
        body: Value,
        kind: &'static str,
        id_field: &str,
    ) -> Result<i64, AdmissionError> {
        let reply = self
            .api
            .send(Method::Post, path, Some(body))
            .map_err(|e| self.fail(step, step_message(&e)))?;
        let id = reply
            .get(id_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.fail(step, format!("respuesta sin {id_field}")))?;
        tracing::debug!(step, kind, id, "admission record created");
        self.created.push(Created { kind, id });
        Ok(id)
    }

    fn fail(&self, step: &'static str, message: String) -> AdmissionError {
        tracing::warn!(step, message = %message, created = self.created.len(), "admission stopped");
        AdmissionError::Step {
            step,
            message,
            created: self.created.clone(),
        }
    }
}

fn step_message(e: &ApiError) -> String {
    match e.server_message() {
        Some(m) if !m.trim().is_empty() => m.to_string(),
        _ => e.to_string(),
    }
}

fn birth(raw: Option<&str>) -> Result<String, AdmissionError> {
    raw.and_then(model::date_to_backend)
        .ok_or(AdmissionError::MissingBirthDate)
}

pub fn submit(
    api: &ApiClient,
    form: &AdmissionForm,
    now: NaiveDateTime,
) -> Result<AdmissionReceipt, AdmissionError> {
    let guardian_birth = birth(form.guardian.birth_date.as_deref())?;
    let applicant_birth = birth(form.applicant.birth_date.as_deref())?;
    let mut chain = Chain {
        api,
        created: Vec::new(),
    };

    let guardian_person_id = chain.create(
        "Error en Persona Acudiente",
        "/persona/crear",
        form.guardian.body(&guardian_birth),
        "persona",
        "idPersona",
    )?;
    let applicant_person_id = chain.create(
        "Error en Persona Estudiante",
        "/persona/crear",
        form.applicant.body(&applicant_birth),
        "persona",
        "idPersona",
    )?;
    let guardian_id = chain.create(
        "Error al crear acudiente",
        "/acudiente/crear",
        json!({
            "persona": { "idPersona": guardian_person_id },
            "correoElectronico": form.email.as_deref().map(str::trim).unwrap_or_default(),
            "telefono": form.phone.as_deref().map(str::trim).unwrap_or_default(),
            "estado": "Pendiente",
        }),
        "acudiente",
        "idAcudiente",
    )?;
    let student_code = chain.create(
        "Error al crear estudiante",
        "/estudiante/crear",
        json!({
            "persona": { "idPersona": applicant_person_id },
            "acudiente": { "idAcudiente": guardian_id },
            "estado": "Pendiente",
        }),
        "estudiante",
        "codigoEstudiante",
    )?;

    let step = "Error al crear preinscripción";
    let reply = api
        .send(
            Method::Post,
            "/preinscripcion/crear",
            Some(json!({
                "aspirante": { "codigoEstudiante": student_code },
                "acudiente": { "idAcudiente": guardian_id },
                "fechaEntrevista": null,
                "lugarEntrevista": null,
                "fechaPreinscripcion": now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            })),
        )
        .map_err(|e| chain.fail(step, step_message(&e)))?;

    tracing::info!(student_code, guardian_id, "admission request registered");
    Ok(AdmissionReceipt {
        guardian_person_id,
        applicant_person_id,
        guardian_id,
        student_code,
        preenrollment_id: reply.get("idPreinscripcion").and_then(Value::as_i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use chrono::NaiveDate;

    fn form() -> AdmissionForm {
        AdmissionForm {
            guardian: PersonFields {
                document: Some("5001".into()),
                first_name: Some("Luz".into()),
                last_name: Some("Gil".into()),
                birth_date: Some("1985-01-20".into()),
                gender: Some("Femenino".into()),
            },
            email: Some("luz@correo.co".into()),
            phone: Some("3105550000".into()),
            applicant: PersonFields {
                document: Some("9001".into()),
                first_name: Some("Sara".into()),
                last_name: Some("Gil".into()),
                birth_date: Some("2018-05-02".into()),
                gender: Some("Femenino".into()),
            },
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 3)
            .and_then(|d| d.and_hms_opt(8, 15, 0))
            .expect("date")
    }

    #[test]
    fn missing_birth_date_sends_nothing() {
        let backend = ScriptedTransport::new();
        let api = backend.client();
        let mut f = form();
        f.applicant.birth_date = None;
        let err = submit(&api, &f, now()).expect_err("missing date");
        assert_eq!(err, AdmissionError::MissingBirthDate);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn full_chain_links_every_record() {
        let backend = ScriptedTransport::new();
        backend
            .on(Method::Post, "/persona/crear", 201, json!({ "idPersona": 11 }))
            .on(Method::Post, "/persona/crear", 201, json!({ "idPersona": 12 }));
        backend.on(Method::Post, "/acudiente/crear", 201, json!({ "idAcudiente": 7 }));
        backend.on(Method::Post, "/estudiante/crear", 201, json!({ "codigoEstudiante": 40 }));
        backend.on(Method::Post, "/preinscripcion/crear", 201, json!({ "idPreinscripcion": 3 }));
        let api = backend.client();

        let receipt = submit(&api, &form(), now()).expect("registered");
        assert_eq!(receipt.student_code, 40);
        assert_eq!(receipt.preenrollment_id, Some(3));

        let calls = backend.calls();
        assert_eq!(calls.len(), 5);
        let first = calls[0].body.clone().expect("body");
        assert_eq!(first["fechaDeNacimiento"], "1985-01-20T00:00:00");
        let student = calls[3].body.clone().expect("body");
        assert_eq!(student["persona"]["idPersona"], 12);
        assert_eq!(student["acudiente"]["idAcudiente"], 7);
        assert_eq!(student["estado"], "Pendiente");
        let pre = calls[4].body.clone().expect("body");
        assert_eq!(pre["fechaPreinscripcion"], "2025-02-03T08:15:00");
        assert!(pre["fechaEntrevista"].is_null());
    }

    #[test]
    fn failure_reports_step_and_created_records() {
        let backend = ScriptedTransport::new();
        backend
            .on(Method::Post, "/persona/crear", 201, json!({ "idPersona": 11 }))
            .on(Method::Post, "/persona/crear", 201, json!({ "idPersona": 12 }));
        backend.on(
            Method::Post,
            "/acudiente/crear",
            400,
            json!({ "mensaje": "Correo inválido" }),
        );
        let api = backend.client();

        let err = submit(&api, &form(), now()).expect_err("stopped");
        assert_eq!(err.to_string(), "Error al crear acudiente: Correo inválido");
        assert_eq!(
            err.created(),
            &[
                Created { kind: "persona", id: 11 },
                Created { kind: "persona", id: 12 },
            ]
        );
        assert_eq!(backend.calls_to(Method::Post, "/estudiante/crear"), 0);
    }
}
