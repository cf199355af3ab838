//! Redfish front end: a read-mostly view of one system and its chassis, plus
//! the reset actions that drive the node's [`Machine`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Error;
use crate::machine::{self, Machine};

/// Identifier of the single system (and chassis) behind every BMC address.
pub const SYSTEM_ID: &str = "System.Embedded.1";

const ALLOWED_RESET_TYPES: [&str; 6] = [
    "On",
    "ForceOff",
    "ForceRestart",
    "GracefulShutdown",
    "PushPowerButton",
    "Nmi",
];

#[derive(Clone)]
struct RedfishState {
    machine: Arc<dyn Machine>,
}

/// Build the Redfish router for one node.
pub fn router(machine: Arc<dyn Machine>) -> Router {
    Router::new()
        .route("/redfish/v1", get(service_root))
        .route("/redfish/v1/", get(service_root))
        .route("/redfish/v1/Chassis", get(chassis_collection))
        .route("/redfish/v1/Chassis/:id", get(chassis).post(reset))
        .route("/redfish/v1/Chassis/:id/Actions/Chassis.Reset", post(reset))
        .route("/redfish/v1/Systems", get(systems_collection))
        .route("/redfish/v1/Systems/:id", get(system).post(reset))
        .route(
            "/redfish/v1/Systems/:id/Actions/ComputerSystem.Reset",
            post(reset),
        )
        .with_state(RedfishState { machine })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetType {
    On,
    ForceOff,
    ForceRestart,
    GracefulShutdown,
    PushPowerButton,
    Nmi,
}

impl ResetType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "On" => Some(Self::On),
            "ForceOff" => Some(Self::ForceOff),
            "ForceRestart" => Some(Self::ForceRestart),
            "GracefulShutdown" => Some(Self::GracefulShutdown),
            "PushPowerButton" => Some(Self::PushPowerButton),
            "Nmi" => Some(Self::Nmi),
            _ => None,
        }
    }

    fn apply(self, machine: &dyn Machine) -> crate::Result<()> {
        match self {
            Self::On => machine::power_on(machine),
            Self::ForceOff | Self::GracefulShutdown => machine::power_off(machine),
            Self::ForceRestart => machine::power_cycle(machine),
            Self::PushPowerButton => machine::toggle(machine),
            Self::Nmi => {
                if !machine.power_status().is_on() {
                    return Err(Error::StateConflict("server is powered off"));
                }
                tracing::info!("NMI requested; not delivered to the guest");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    #[serde(rename = "ResetType")]
    reset_type: String,
}

/// A Redfish error response (`{"error": {...}}` with one extended info entry).
#[derive(Debug)]
struct RedfishError {
    status: StatusCode,
    message_id: &'static str,
    message: String,
}

impl RedfishError {
    fn not_found(id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message_id: "Base.1.0.ResourceMissingAtURI",
            message: format!("resource {id} does not exist"),
        }
    }

    fn bad_request(message_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message_id,
            message: message.into(),
        }
    }
}

impl From<Error> for RedfishError {
    fn from(err: Error) -> Self {
        let (status, message_id) = match &err {
            Error::StateConflict(_) => (StatusCode::CONFLICT, "Base.1.0.ResourceInUse"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Base.1.0.InternalError"),
        };
        Self {
            status,
            message_id,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for RedfishError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": "Base.1.0.GeneralError",
                "message": "A general error has occurred. See ExtendedInfo for more information.",
                "@Message.ExtendedInfo": [{
                    "@odata.type": "#Message.v1_0_0.Message",
                    "MessageId": self.message_id,
                    "Message": self.message,
                    "Severity": "Critical",
                }],
            }
        });
        (self.status, Json(body)).into_response()
    }
}

fn check_id(id: &str) -> Result<(), RedfishError> {
    if id == SYSTEM_ID {
        Ok(())
    } else {
        Err(RedfishError::not_found(id))
    }
}

async fn service_root() -> Json<Value> {
    Json(json!({
        "@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot",
        "@odata.id": "/redfish/v1",
        "Id": "RootService",
        "Name": "Root Service",
        "RedfishVersion": "1.6.0",
        "Systems": { "@odata.id": "/redfish/v1/Systems" },
        "Chassis": { "@odata.id": "/redfish/v1/Chassis" },
    }))
}

fn collection(kind: &str, odata_type: &str) -> Value {
    json!({
        "@odata.type": odata_type,
        "@odata.id": format!("/redfish/v1/{kind}"),
        "Name": format!("{kind} Collection"),
        "Members@odata.count": 1,
        "Members": [{ "@odata.id": format!("/redfish/v1/{kind}/{SYSTEM_ID}") }],
    })
}

async fn chassis_collection() -> Json<Value> {
    Json(collection("Chassis", "#ChassisCollection.ChassisCollection"))
}

async fn systems_collection() -> Json<Value> {
    Json(collection(
        "Systems",
        "#ComputerSystemCollection.ComputerSystemCollection",
    ))
}

async fn chassis(
    State(state): State<RedfishState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RedfishError> {
    check_id(&id)?;
    Ok(Json(json!({
        "@odata.type": "#Chassis.v1_10_0.Chassis",
        "@odata.id": format!("/redfish/v1/Chassis/{SYSTEM_ID}"),
        "Id": SYSTEM_ID,
        "Name": "Computer System Chassis",
        "ChassisType": "RackMount",
        "PowerState": state.machine.power_status(),
        "Links": {
            "ComputerSystems": [{ "@odata.id": format!("/redfish/v1/Systems/{SYSTEM_ID}") }],
        },
        "Actions": {
            "#Chassis.Reset": {
                "target": format!("/redfish/v1/Chassis/{SYSTEM_ID}/Actions/Chassis.Reset"),
                "ResetType@Redfish.AllowableValues": ALLOWED_RESET_TYPES,
            },
        },
    })))
}

async fn system(
    State(state): State<RedfishState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RedfishError> {
    check_id(&id)?;
    Ok(Json(json!({
        "@odata.type": "#ComputerSystem.v1_10_0.ComputerSystem",
        "@odata.id": format!("/redfish/v1/Systems/{SYSTEM_ID}"),
        "Id": SYSTEM_ID,
        "Name": "System",
        "SystemType": "Virtual",
        "PowerState": state.machine.power_status(),
        "Links": {
            "Chassis": [{ "@odata.id": format!("/redfish/v1/Chassis/{SYSTEM_ID}") }],
        },
        "Actions": {
            "#ComputerSystem.Reset": {
                "target": format!("/redfish/v1/Systems/{SYSTEM_ID}/Actions/ComputerSystem.Reset"),
                "ResetType@Redfish.AllowableValues": ALLOWED_RESET_TYPES,
            },
        },
    })))
}

async fn reset(
    State(state): State<RedfishState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, RedfishError> {
    check_id(&id)?;

    let request: ResetRequest = serde_json::from_slice(&body)
        .map_err(|err| RedfishError::bad_request("Base.1.0.MalformedJSON", err.to_string()))?;
    let reset_type = ResetType::parse(&request.reset_type).ok_or_else(|| {
        RedfishError::bad_request(
            "Base.1.0.ActionParameterValueNotInList",
            format!("unsupported ResetType {}", request.reset_type),
        )
    })?;

    let outcome = reset_type.apply(&*state.machine);
    let status = match &outcome {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(Error::StateConflict(_)) => StatusCode::CONFLICT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    crate::observe::record_reset(&request.reset_type, status.as_u16());

    outcome?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_types_parse_exactly() {
        for name in ALLOWED_RESET_TYPES {
            assert!(ResetType::parse(name).is_some(), "{name}");
        }
        assert_eq!(ResetType::parse("on"), None);
        assert_eq!(ResetType::parse("GracefulRestart"), None);
    }

    #[test]
    fn state_conflict_maps_to_409() {
        let err = RedfishError::from(Error::StateConflict("server already powered on"));
        assert_eq!(err.status, StatusCode::CONFLICT);
        let err = RedfishError::from(Error::machine("qemu exited"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
