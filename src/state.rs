//! Remediation state machine.
//!
//! Lifecycle states of a flagged transaction, stored in the
//! `ESTADO DE REMEDIACION` column. Transitions are permissive by design:
//! any state may move to any other via an explicit status update. Legality
//! judgement belongs to the reviewer or agent driving the update, not here.

use serde::{Deserialize, Serialize};

/// Remediation lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationState {
    /// Unclassified or ineligible for an outbound protocol.
    NoProcesado,
    /// Notice dispatched, awaiting counterparty reply.
    EnProceso,
    /// First unsatisfactory reply received.
    RespuestaInvalida1,
    /// Second unsatisfactory reply received.
    RespuestaInvalida2,
    /// Escalated to a human operator.
    ProcesamientoManual,
    /// Resolved.
    Completado,
}

impl RemediationState {
    /// All states, in escalation order. Mirrors the `Estados` sheet.
    pub const ALL: [RemediationState; 6] = [
        Self::NoProcesado,
        Self::EnProceso,
        Self::RespuestaInvalida1,
        Self::RespuestaInvalida2,
        Self::ProcesamientoManual,
        Self::Completado,
    ];

    /// The label stored in the sheet.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoProcesado => "No Procesado",
            Self::EnProceso => "En Proceso",
            Self::RespuestaInvalida1 => "Respuesta Invalida 1",
            Self::RespuestaInvalida2 => "Respuesta Invalida 2",
            Self::ProcesamientoManual => "Procesamiento Manual",
            Self::Completado => "Completado",
        }
    }

    /// Short description for the `Estados` sheet.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoProcesado => "Sin clasificar o fuera de protocolo",
            Self::EnProceso => "Notificacion enviada, esperando respuesta",
            Self::RespuestaInvalida1 => "Primera respuesta no satisfactoria",
            Self::RespuestaInvalida2 => "Segunda respuesta no satisfactoria",
            Self::ProcesamientoManual => "Escalado a revision manual",
            Self::Completado => "Caso resuelto",
        }
    }
}

impl std::fmt::Display for RemediationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for RemediationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown remediation state: {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn label_round_trips() {
        for state in RemediationState::ALL {
            assert_eq!(RemediationState::from_str(state.label()), Ok(state));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            RemediationState::from_str("en proceso"),
            Ok(RemediationState::EnProceso)
        );
        assert_eq!(
            RemediationState::from_str("  Completado "),
            Ok(RemediationState::Completado)
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(RemediationState::from_str("Archivado").is_err());
    }
}
