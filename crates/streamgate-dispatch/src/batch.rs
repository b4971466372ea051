use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;
use crate::error::{DispatchError, Result};

/// An ordered set of commands submitted and completed together.
///
/// The prelude commands only report success or failure; the body commands
/// carry the values the caller is after. Results come back tagged the same
/// way, so callers never index into a flat result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    prelude: Vec<Command>,
    body: Vec<Command>,
}

impl Batch {
    pub fn new(prelude: Vec<Command>, body: Vec<Command>) -> Self {
        Self { prelude, body }
    }

    pub fn prelude(&self) -> &[Command] {
        &self.prelude
    }

    pub fn body(&self) -> &[Command] {
        &self.body
    }

    /// Total number of commands.
    pub fn len(&self) -> usize {
        self.prelude.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All commands in submission order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.prelude.iter().chain(self.body.iter())
    }

    /// Rendered command strings in submission order.
    pub fn render(&self) -> Vec<String> {
        self.commands().map(Command::render).collect()
    }

    /// Split a flat, ordered result list back into prelude and body.
    ///
    /// Fails if the count does not match or any prelude command failed.
    pub fn split_results(&self, mut results: Vec<CommandResult>) -> Result<BatchResults> {
        if results.len() != self.len() {
            return Err(DispatchError::ResultCount {
                expected: self.len(),
                got: results.len(),
            });
        }

        let body = results.split_off(self.prelude.len());
        for (command, result) in self.prelude.iter().zip(&results) {
            result.check(command.name())?;
        }

        let body = self
            .body
            .iter()
            .zip(body)
            .map(|(command, result)| (command.name(), result))
            .collect();

        Ok(BatchResults {
            prelude: results,
            body,
        })
    }
}

/// Outcome of one backend command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn success(value: Option<Value>) -> Self {
        Self {
            ok: true,
            value,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(message.into()),
        }
    }

    fn check(&self, command: &'static str) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(DispatchError::CommandFailed {
                command,
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "no error message".to_string()),
            })
        }
    }
}

/// Results of a completed batch, tagged by role.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResults {
    /// Prelude results, all known to be successful.
    pub prelude: Vec<CommandResult>,
    body: Vec<(&'static str, CommandResult)>,
}

impl BatchResults {
    /// Number of body results.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Take the body values in order. A failed body command becomes
    /// [`DispatchError::CommandFailed`]; JSON `null` becomes `None`.
    pub fn into_values(self) -> Result<Vec<Option<Value>>> {
        self.body
            .into_iter()
            .map(|(command, result)| {
                result.check(command)?;
                Ok(result.value.filter(|v| !v.is_null()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame_batch() -> Batch {
        Batch::new(
            vec![
                Command::Authorize {
                    session: "tok".to_string(),
                },
                Command::SetActingIdentity {
                    target: "bot".to_string(),
                },
            ],
            vec![Command::ApplicationCall {
                protocol: "S228".to_string(),
                endpoint: "1.2.3.4:5".to_string(),
                payload_b64: "AA==".to_string(),
            }],
        )
    }

    #[test]
    fn splits_prelude_from_body() {
        let batch = frame_batch();
        assert_eq!(batch.len(), 3);
        let results = batch
            .split_results(vec![
                CommandResult::success(Some(json!(true))),
                CommandResult::success(None),
                CommandResult::success(Some(json!("cmVwbHk="))),
            ])
            .unwrap();
        assert_eq!(results.prelude.len(), 2);
        assert_eq!(results.body_len(), 1);
        assert_eq!(
            results.into_values().unwrap(),
            vec![Some(json!("cmVwbHk="))]
        );
    }

    #[test]
    fn longer_prelude_still_finds_body() {
        let mut prelude = frame_batch().prelude().to_vec();
        prelude.push(Command::SetContext {
            area: "root".to_string(),
        });
        let batch = Batch::new(prelude, frame_batch().body().to_vec());
        let values = batch
            .split_results(vec![
                CommandResult::success(None),
                CommandResult::success(None),
                CommandResult::success(None),
                CommandResult::success(Some(json!("eA=="))),
            ])
            .unwrap()
            .into_values()
            .unwrap();
        assert_eq!(values, vec![Some(json!("eA=="))]);
    }

    #[test]
    fn failed_prelude_is_an_error() {
        let err = frame_batch()
            .split_results(vec![
                CommandResult::failure("session expired"),
                CommandResult::success(None),
                CommandResult::success(None),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::CommandFailed { command: "authorize", ref message } if message == "session expired"
        ));
    }

    #[test]
    fn failed_body_surfaces_on_values() {
        let results = frame_batch()
            .split_results(vec![
                CommandResult::success(None),
                CommandResult::success(None),
                CommandResult::failure("parse error"),
            ])
            .unwrap();
        assert!(matches!(
            results.into_values(),
            Err(DispatchError::CommandFailed {
                command: "application_call",
                ..
            })
        ));
    }

    #[test]
    fn null_value_is_none() {
        let values = frame_batch()
            .split_results(vec![
                CommandResult::success(None),
                CommandResult::success(None),
                CommandResult::success(Some(Value::Null)),
            ])
            .unwrap()
            .into_values()
            .unwrap();
        assert_eq!(values, vec![None]);
    }

    #[test]
    fn result_count_mismatch() {
        let err = frame_batch()
            .split_results(vec![CommandResult::success(None)])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ResultCount {
                expected: 3,
                got: 1
            }
        ));
    }

    #[test]
    fn result_json_shape() {
        let parsed: CommandResult = serde_json::from_str(r#"{"ok":true,"value":null}"#).unwrap();
        assert_eq!(parsed, CommandResult::success(None));
        let failed: CommandResult =
            serde_json::from_str(r#"{"ok":false,"error":"denied"}"#).unwrap();
        assert_eq!(failed, CommandResult::failure("denied"));
    }
}
