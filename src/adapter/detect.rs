//! Heuristic field detection for async-job responses.
//!
//! Providers without a fixed contract put task ids, statuses, and
//! errors under different names. Detection tries an ordered candidate
//! list and takes the first hit. This is a best-effort heuristic, not a
//! contract: an unlisted provider may name a field something these
//! lists silently misread. Methods that know their provider's shape
//! should configure explicit paths instead.

use serde_json::Value;

use crate::util::data_path;

/// Candidate paths for the async task identifier, in priority order.
pub const TASK_ID_PATHS: [&str; 10] = [
    "id",
    "request_id",
    "task_id",
    "job_id",
    "prediction_id",
    "data.id",
    "data.request_id",
    "data.task_id",
    "data.job_id",
    "data.prediction_id",
];

/// Candidate paths for the job status field.
pub const STATUS_PATHS: [&str; 6] = [
    "status",
    "state",
    "task_status",
    "data.status",
    "data.state",
    "data.task_status",
];

/// Candidate paths for a provider error message.
pub const ERROR_PATHS: [&str; 8] = [
    "error",
    "error_message",
    "message",
    "detail",
    "data.error",
    "data.error_message",
    "data.message",
    "data.detail",
];

/// Containers checked, in order, for the completed job's payload.
pub const RESULT_CONTAINERS: [&str; 3] = ["data", "result", "output"];

/// Find the async task identifier in an initial job response.
pub fn detect_task_id(body: &Value) -> Option<String> {
    first_scalar_at(body, &TASK_ID_PATHS)
}

/// Find the job status, preferring an explicitly configured path.
pub fn detect_status(body: &Value, explicit_path: Option<&str>) -> Option<String> {
    if let Some(path) = explicit_path {
        return data_path::get_path(body, path)
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    first_scalar_at(body, &STATUS_PATHS)
}

/// Best-effort extraction of a provider error message.
pub fn detect_error_message(body: &Value) -> Option<String> {
    for path in ERROR_PATHS {
        match data_path::get_path(body, path) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            // error objects usually nest the text under `message`
            Some(Value::Object(map)) => {
                if let Some(Value::String(s)) = map.get("message") {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the completed job's result: an explicit path when
/// configured, else the first object-valued container, else the whole
/// body. (`response_url` indirection is handled by the polling loop,
/// which can fetch.)
pub fn extract_result(body: &Value, explicit_path: Option<&str>) -> Value {
    if let Some(path) = explicit_path {
        if let Some(value) = data_path::get_path(body, path) {
            return value.clone();
        }
    }
    for key in RESULT_CONTAINERS {
        if let Some(value) = body.get(key) {
            if value.is_object() {
                return value.clone();
            }
        }
    }
    body.clone()
}

fn first_scalar_at(body: &Value, paths: &[&str]) -> Option<String> {
    for path in paths {
        match data_path::get_path(body, path) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_id_prefers_earlier_candidates() {
        let body = json!({"id": "a", "task_id": "b"});
        assert_eq!(detect_task_id(&body), Some("a".to_string()));
    }

    #[test]
    fn task_id_falls_through_to_nested_data() {
        let body = json!({"data": {"task_id": "t-1"}});
        assert_eq!(detect_task_id(&body), Some("t-1".to_string()));
    }

    #[test]
    fn numeric_task_ids_stringify() {
        let body = json!({"id": 42});
        assert_eq!(detect_task_id(&body), Some("42".to_string()));
    }

    #[test]
    fn no_candidate_yields_none() {
        assert_eq!(detect_task_id(&json!({"foo": "bar"})), None);
    }

    #[test]
    fn explicit_status_path_overrides_heuristics() {
        let body = json!({"status": "wrong", "meta": {"phase": "done"}});
        assert_eq!(
            detect_status(&body, Some("meta.phase")),
            Some("done".to_string())
        );
        assert_eq!(detect_status(&body, None), Some("wrong".to_string()));
    }

    #[test]
    fn error_message_reads_string_or_object_shapes() {
        assert_eq!(
            detect_error_message(&json!({"error": "boom"})),
            Some("boom".to_string())
        );
        assert_eq!(
            detect_error_message(&json!({"error": {"message": "nested boom"}})),
            Some("nested boom".to_string())
        );
        assert_eq!(detect_error_message(&json!({"ok": true})), None);
    }

    #[test]
    fn result_prefers_first_object_container() {
        let body = json!({"status": "completed", "result": {"url": "https://x"}});
        assert_eq!(extract_result(&body, None), json!({"url": "https://x"}));
    }

    #[test]
    fn result_skips_non_object_containers() {
        let body = json!({"data": "plain", "output": {"v": 1}});
        assert_eq!(extract_result(&body, None), json!({"v": 1}));
    }

    #[test]
    fn result_defaults_to_whole_body() {
        let body = json!({"status": "completed", "value": 3});
        assert_eq!(extract_result(&body, None), body);
    }

    #[test]
    fn result_honors_explicit_path() {
        let body = json!({"data": {"deep": {"url": "https://x"}}});
        assert_eq!(
            extract_result(&body, Some("data.deep")),
            json!({"url": "https://x"})
        );
    }
}
