//! The single result shape every tool reports.

use serde_json::{json, Map, Value};

use crate::error::GatewayError;

/// A step of a multi-step operation that did not complete.
#[derive(Debug)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: GatewayError,
}

impl StepFailure {
    pub fn new(step: &'static str, error: GatewayError) -> Self {
        Self { step, error }
    }

    fn to_json(&self) -> Value {
        json!({
            "step": self.step,
            "category": self.error.category(),
            "error": self.error.to_string(),
        })
    }
}

#[derive(Debug)]
pub enum OperationResult<T> {
    Success(T),
    /// Earlier steps took effect and were not undone; the listed steps need
    /// manual follow-up.
    PartialSuccess {
        payload: T,
        failures: Vec<StepFailure>,
    },
    Failure(GatewayError),
}

impl<T> OperationResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        match self {
            OperationResult::Success(payload) => OperationResult::Success(f(payload)),
            OperationResult::PartialSuccess { payload, failures } => {
                OperationResult::PartialSuccess {
                    payload: f(payload),
                    failures,
                }
            }
            OperationResult::Failure(e) => OperationResult::Failure(e),
        }
    }
}

impl<T> From<Result<T, GatewayError>> for OperationResult<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(payload) => OperationResult::Success(payload),
            Err(e) => OperationResult::Failure(e),
        }
    }
}

impl From<GatewayError> for OperationResult<Value> {
    fn from(err: GatewayError) -> Self {
        OperationResult::Failure(err)
    }
}

impl OperationResult<Value> {
    /// Combine independently run steps. Succeeded steps are keys of
    /// `completed`; if none succeeded the first failure is reported.
    pub fn from_steps(completed: Map<String, Value>, mut failures: Vec<StepFailure>) -> Self {
        if failures.is_empty() {
            OperationResult::Success(Value::Object(completed))
        } else if completed.is_empty() {
            OperationResult::Failure(failures.remove(0).error)
        } else {
            OperationResult::PartialSuccess {
                payload: Value::Object(completed),
                failures,
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            OperationResult::Success(payload) => with_status("success", payload),
            OperationResult::PartialSuccess { payload, failures } => {
                let mut obj = with_status("partial_success", payload);
                if let Some(map) = obj.as_object_mut() {
                    map.insert(
                        "failures".into(),
                        Value::Array(failures.iter().map(StepFailure::to_json).collect()),
                    );
                }
                obj
            }
            OperationResult::Failure(e) => e.to_json(),
        }
    }
}

fn with_status(status: &str, payload: &Value) -> Value {
    let mut map = Map::new();
    map.insert("status".into(), json!(status));
    match payload {
        Value::Object(fields) => {
            for (k, v) in fields {
                map.insert(k.clone(), v.clone());
            }
        }
        other => {
            map.insert("result".into(), other.clone());
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_success_merges_payload() {
        let result = OperationResult::Success(json!({"repo": "demo", "result": {"status": "deleted"}}));
        let json = result.to_json();
        assert_eq!(json["status"], "success");
        assert_eq!(json["repo"], "demo");
        assert_eq!(json["result"]["status"], "deleted");
    }

    #[test]
    fn test_non_object_payload_is_nested() {
        let json = OperationResult::Success(json!([1, 2])).to_json();
        assert_eq!(json["result"], json!([1, 2]));
    }

    #[test]
    fn test_partial_success_lists_failures() {
        let result = OperationResult::PartialSuccess {
            payload: json!({"readme": "failed"}),
            failures: vec![StepFailure::new("seed_readme", GatewayError::Unexpected("boom".into()))],
        };
        let json = result.to_json();
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["readme"], "failed");
        assert_eq!(json["failures"][0]["step"], "seed_readme");
        assert_eq!(json["failures"][0]["category"], "unexpected");
        assert_eq!(json["failures"][0]["error"], "boom");
    }

    #[test]
    fn test_from_steps() {
        let mut done = Map::new();
        assert!(matches!(
            OperationResult::from_steps(done.clone(), vec![]),
            OperationResult::Success(_)
        ));

        let failed = OperationResult::from_steps(
            done.clone(),
            vec![StepFailure::new("update", GatewayError::NoFieldsToUpdate)],
        );
        match failed {
            OperationResult::Failure(e) => assert_eq!(e.category(), ErrorCategory::NoFieldsToUpdate),
            other => panic!("expected failure, got {:?}", other),
        }

        done.insert("comment".into(), json!({"id": 1}));
        let partial = OperationResult::from_steps(
            done,
            vec![StepFailure::new("update", GatewayError::Unexpected("x".into()))],
        );
        assert!(matches!(partial, OperationResult::PartialSuccess { .. }));
    }

    #[test]
    fn test_map_keeps_failures() {
        let result: OperationResult<Value> = OperationResult::PartialSuccess {
            payload: json!({"a": 1}),
            failures: vec![StepFailure::new("comment", GatewayError::Unexpected("x".into()))],
        };
        match result.map(|p| json!({"result": p})) {
            OperationResult::PartialSuccess { payload, failures } => {
                assert_eq!(payload["result"]["a"], 1);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_result() {
        let ok: OperationResult<Value> = Result::<Value, GatewayError>::Ok(json!({})).into();
        assert!(matches!(ok, OperationResult::Success(_)));
        let err: OperationResult<Value> = Result::<Value, GatewayError>::Err(GatewayError::NoFieldsToUpdate).into();
        assert!(matches!(err, OperationResult::Failure(GatewayError::NoFieldsToUpdate)));
    }
}
