//! Closed set of chaincode operations.
//!
//! Callers name an operation and pass its arguments as a JSON object. Parsing
//! either yields a typed [`ClaimQuery`] / [`ClaimCommand`] or fails before
//! anything reaches the network:
//!
//! | Function | Kind | Arguments | Roles |
//! |----------|------|-----------|-------|
//! | `getClaimsByStatus` | query | `status` | any |
//! | `getClaimsByPatient` | query | `patientId` | any |
//! | `getClaimsByDoctor` | query | `doctorId` | any |
//! | `getClaimsByHospital` | query | `hospitalId` | any |
//! | `getClaim` | query | `claimId` | any |
//! | `createClaim` | invoke | see [`NewClaim`] | hospital, doctor |
//! | `updateClaimStatus` | invoke | `claimId`, `status` | insurer |

use std::{fmt, str::FromStr};

use claimnet_wallet::Role;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{FabricError, Result};

const GET_CLAIMS_BY_STATUS: &str = "getClaimsByStatus";
const GET_CLAIMS_BY_PATIENT: &str = "getClaimsByPatient";
const GET_CLAIMS_BY_DOCTOR: &str = "getClaimsByDoctor";
const GET_CLAIMS_BY_HOSPITAL: &str = "getClaimsByHospital";
const GET_CLAIM: &str = "getClaim";
const CREATE_CLAIM: &str = "createClaim";
const UPDATE_CLAIM_STATUS: &str = "updateClaimStatus";

/// Argument map as received from callers.
pub type Arguments = Map<String, Value>;

/// Lifecycle state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    /// Filed, awaiting adjudication.
    Pending,
    /// Accepted by the insurer.
    Approved,
    /// Declined by the insurer.
    Rejected,
    /// Settled.
    Paid,
}

impl ClaimStatus {
    /// Returns the on-ledger spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::Pending, Self::Approved, Self::Rejected, Self::Paid]
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                FabricError::invalid_arguments("status", format!("unknown claim status '{s}'"))
            })
    }
}

/// A read-only chaincode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimQuery {
    /// `getClaimsByStatus`
    ByStatus(ClaimStatus),
    /// `getClaimsByPatient`
    ByPatient(String),
    /// `getClaimsByDoctor`
    ByDoctor(String),
    /// `getClaimsByHospital`
    ByHospital(String),
    /// `getClaim`
    Claim(String),
}

impl ClaimQuery {
    /// Parses a named query and its arguments.
    ///
    /// # Errors
    ///
    /// - [`FabricError::UnsupportedOperation`] if `name` is not a query.
    /// - [`FabricError::InvalidArguments`] if `args` has the wrong shape.
    pub fn parse(name: &str, args: &Arguments) -> Result<Self> {
        match name {
            GET_CLAIMS_BY_STATUS => {
                let StatusArgs { status } = decode(GET_CLAIMS_BY_STATUS, args)?;
                Ok(Self::ByStatus(status))
            },
            GET_CLAIMS_BY_PATIENT => {
                let PatientArgs { patient_id } = decode(GET_CLAIMS_BY_PATIENT, args)?;
                Ok(Self::ByPatient(non_empty(GET_CLAIMS_BY_PATIENT, "patientId", patient_id)?))
            },
            GET_CLAIMS_BY_DOCTOR => {
                let DoctorArgs { doctor_id } = decode(GET_CLAIMS_BY_DOCTOR, args)?;
                Ok(Self::ByDoctor(non_empty(GET_CLAIMS_BY_DOCTOR, "doctorId", doctor_id)?))
            },
            GET_CLAIMS_BY_HOSPITAL => {
                let HospitalArgs { hospital_id } = decode(GET_CLAIMS_BY_HOSPITAL, args)?;
                Ok(Self::ByHospital(non_empty(GET_CLAIMS_BY_HOSPITAL, "hospitalId", hospital_id)?))
            },
            GET_CLAIM => {
                let ClaimArgs { claim_id } = decode(GET_CLAIM, args)?;
                Ok(Self::Claim(non_empty(GET_CLAIM, "claimId", claim_id)?))
            },
            other => Err(FabricError::UnsupportedOperation { name: other.to_owned() }),
        }
    }

    /// Returns the chaincode function name.
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::ByStatus(_) => GET_CLAIMS_BY_STATUS,
            Self::ByPatient(_) => GET_CLAIMS_BY_PATIENT,
            Self::ByDoctor(_) => GET_CLAIMS_BY_DOCTOR,
            Self::ByHospital(_) => GET_CLAIMS_BY_HOSPITAL,
            Self::Claim(_) => GET_CLAIM,
        }
    }

    /// Returns the positional chaincode arguments.
    #[must_use]
    pub fn chaincode_args(&self) -> Vec<String> {
        match self {
            Self::ByStatus(status) => vec![status.as_str().to_owned()],
            Self::ByPatient(id) | Self::ByDoctor(id) | Self::ByHospital(id) | Self::Claim(id) => {
                vec![id.clone()]
            },
        }
    }

    /// Returns `true` if the chaincode answers with a list of records.
    #[must_use]
    pub fn returns_list(&self) -> bool {
        !matches!(self, Self::Claim(_))
    }
}

/// Fields of a new claim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewClaim {
    /// Claim id, unique on the ledger.
    pub claim_id: String,
    /// Patient the claim is for.
    pub patient_id: String,
    /// Treating doctor.
    pub doctor_id: String,
    /// Treating hospital.
    pub hospital_id: String,
    /// Claimed amount.
    pub amount: f64,
    /// Free-text description.
    pub description: String,
}

/// A state-changing chaincode call.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimCommand {
    /// `createClaim`
    Create(NewClaim),
    /// `updateClaimStatus`
    UpdateStatus {
        /// Claim to update.
        claim_id: String,
        /// New status.
        status: ClaimStatus,
    },
}

impl ClaimCommand {
    /// Parses a named write and its arguments.
    ///
    /// # Errors
    ///
    /// - [`FabricError::UnsupportedOperation`] if `name` is not a write.
    /// - [`FabricError::InvalidArguments`] if `args` has the wrong shape.
    pub fn parse(name: &str, args: &Arguments) -> Result<Self> {
        match name {
            CREATE_CLAIM => {
                let claim: NewClaim = decode(CREATE_CLAIM, args)?;
                let claim = NewClaim {
                    claim_id: non_empty(CREATE_CLAIM, "claimId", claim.claim_id)?,
                    patient_id: non_empty(CREATE_CLAIM, "patientId", claim.patient_id)?,
                    doctor_id: non_empty(CREATE_CLAIM, "doctorId", claim.doctor_id)?,
                    hospital_id: non_empty(CREATE_CLAIM, "hospitalId", claim.hospital_id)?,
                    description: non_empty(CREATE_CLAIM, "description", claim.description)?,
                    ..claim
                };
                if !claim.amount.is_finite() || claim.amount <= 0.0 {
                    return Err(FabricError::invalid_arguments(
                        CREATE_CLAIM,
                        "amount must be a positive number",
                    ));
                }
                Ok(Self::Create(claim))
            },
            UPDATE_CLAIM_STATUS => {
                let UpdateStatusArgs { claim_id, status } = decode(UPDATE_CLAIM_STATUS, args)?;
                Ok(Self::UpdateStatus {
                    claim_id: non_empty(UPDATE_CLAIM_STATUS, "claimId", claim_id)?,
                    status,
                })
            },
            other => Err(FabricError::UnsupportedOperation { name: other.to_owned() }),
        }
    }

    /// Returns the chaincode function name.
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Create(_) => CREATE_CLAIM,
            Self::UpdateStatus { .. } => UPDATE_CLAIM_STATUS,
        }
    }

    /// Returns the positional chaincode arguments.
    #[must_use]
    pub fn chaincode_args(&self) -> Vec<String> {
        match self {
            Self::Create(claim) => vec![
                claim.claim_id.clone(),
                claim.patient_id.clone(),
                claim.doctor_id.clone(),
                claim.hospital_id.clone(),
                claim.amount.to_string(),
                claim.description.clone(),
            ],
            Self::UpdateStatus { claim_id, status } => {
                vec![claim_id.clone(), status.as_str().to_owned()]
            },
        }
    }

    /// Returns the roles permitted to submit this write.
    #[must_use]
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Self::Create(_) => &[Role::Hospital, Role::Doctor],
            Self::UpdateStatus { .. } => &[Role::Insurer],
        }
    }
}

/// Any supported chaincode call.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOperation {
    /// Evaluated against a single peer, never ordered.
    Query(ClaimQuery),
    /// Endorsed, ordered, and committed.
    Command(ClaimCommand),
}

impl LedgerOperation {
    /// Parses any supported operation.
    ///
    /// # Errors
    ///
    /// - [`FabricError::UnsupportedOperation`] for names outside the set.
    /// - [`FabricError::InvalidArguments`] if `args` has the wrong shape.
    pub fn parse(name: &str, args: &Arguments) -> Result<Self> {
        match ClaimQuery::parse(name, args) {
            Err(FabricError::UnsupportedOperation { .. }) => {
                ClaimCommand::parse(name, args).map(Self::Command)
            },
            other => other.map(Self::Query),
        }
    }

    /// Returns the chaincode function name.
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Query(query) => query.function_name(),
            Self::Command(command) => command.function_name(),
        }
    }

    /// Returns the positional chaincode arguments.
    #[must_use]
    pub fn chaincode_args(&self) -> Vec<String> {
        match self {
            Self::Query(query) => query.chaincode_args(),
            Self::Command(command) => command.chaincode_args(),
        }
    }

    /// Returns `true` for state-changing operations.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

impl From<ClaimQuery> for LedgerOperation {
    fn from(query: ClaimQuery) -> Self {
        Self::Query(query)
    }
}

impl From<ClaimCommand> for LedgerOperation {
    fn from(command: ClaimCommand) -> Self {
        Self::Command(command)
    }
}

// ---------------------------------------------------------------------------
// Argument shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusArgs {
    status: ClaimStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PatientArgs {
    patient_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DoctorArgs {
    doctor_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HospitalArgs {
    hospital_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClaimArgs {
    claim_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateStatusArgs {
    claim_id: String,
    status: ClaimStatus,
}

fn decode<T: DeserializeOwned>(operation: &'static str, args: &Arguments) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| FabricError::invalid_arguments(operation, e.to_string()))
}

fn non_empty(operation: &'static str, field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(FabricError::invalid_arguments(operation, format!("{field} must not be empty")));
    }
    Ok(value)
}
