//! Treatment relationships that grant doctors consent-free access

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use swasthya_shared::{new_id, validate_identifier, HealthError, HealthResult, ValidationResult};
use tracing::info;

/// A doctor who has treated, or is scheduled to treat, a patient
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AppointmentRelation {
    pub doctor_id: String,
    pub patient_id: String,
}

/// Answers whether a doctor-patient treatment relation exists
pub trait RelationshipSource: Send + Sync {
    fn has_relation(&self, doctor_id: &str, patient_id: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Cancelled appointments never establish a relation
    pub fn relation(&self) -> Option<AppointmentRelation> {
        (self.status != AppointmentStatus::Cancelled).then(|| AppointmentRelation {
            doctor_id: self.doctor_id.clone(),
            patient_id: self.patient_id.clone(),
        })
    }
}

/// In-memory appointment book backing the appointment authorization path
#[derive(Debug, Default)]
pub struct AppointmentBook {
    appointments: RwLock<HashMap<String, Appointment>>,
}

impl AppointmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book(
        &self,
        doctor_id: &str,
        patient_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> HealthResult<Appointment> {
        let mut result = ValidationResult::new();
        result.merge(validate_identifier(doctor_id, "doctor_id"));
        result.merge(validate_identifier(patient_id, "patient_id"));
        result.into_result()?;

        let appointment = Appointment {
            id: new_id(),
            doctor_id: doctor_id.to_string(),
            patient_id: patient_id.to_string(),
            scheduled_for,
            status: AppointmentStatus::Scheduled,
        };
        info!(
            appointment_id = %appointment.id,
            doctor_id,
            patient_id,
            "appointment booked"
        );
        self.appointments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

    pub fn set_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> HealthResult<Appointment> {
        let mut appointments = self
            .appointments
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let appointment = appointments
            .get_mut(appointment_id)
            .ok_or_else(|| HealthError::NotFound(format!("appointment {}", appointment_id)))?;
        appointment.status = status;
        Ok(appointment.clone())
    }

    /// Distinct live relations for a doctor
    pub fn relations_for_doctor(&self, doctor_id: &str) -> Vec<AppointmentRelation> {
        let mut relations: Vec<AppointmentRelation> = self
            .appointments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .filter_map(Appointment::relation)
            .collect();
        relations.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        relations.dedup();
        relations
    }
}

impl RelationshipSource for AppointmentBook {
    fn has_relation(&self, doctor_id: &str, patient_id: &str) -> bool {
        self.appointments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Appointment::relation)
            .any(|r| r.doctor_id == doctor_id && r.patient_id == patient_id)
    }
}
