use ulid::Ulid;

/// Identifier attached to every log line of one command invocation.
pub fn new_run_id() -> String {
    Ulid::new().to_string()
}
