use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Person whose clearance is requested. Maps to `subjects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub subject_id: i64,
    pub index_no: Option<String>,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub nationality_iso_code: Option<String>,
    pub country_of_birth: Option<String>,
    pub country_of_birth_iso_code: Option<String>,
    pub email_address: Option<String>,
}

/// A subject's placement on one assignment; the subject/program relation.
/// Maps to `programs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Program {
    pub program_id: i64,
    pub subject_id: i64,
    pub deployment_id: Option<i64>,
    pub department: Option<String>,
    pub requestor_name: Option<String>,
    pub requestor_email: Option<String>,
    pub employee_type: Option<String>,
    pub functional_title: Option<String>,
    pub duty_station_code: Option<String>,
    pub duty_station_description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub requested_on: DateTime<Utc>,
}
