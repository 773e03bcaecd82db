use grantry_core::{AppError, AppResult};

/// Renders a template access command for one target pod.
///
/// Supported placeholders are `{{ .Metadata.Name }}` and
/// `{{ .Metadata.Namespace }}`; inner whitespace is ignored.
pub fn render_access_command(pattern: &str, name: &str, namespace: &str) -> AppResult<String> {
    let mut rendered = String::with_capacity(pattern.len() + name.len() + namespace.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            AppError::Validation(format!("unterminated placeholder in access command '{pattern}'"))
        })?;

        match after_open[..end].trim() {
            ".Metadata.Name" => rendered.push_str(name),
            ".Metadata.Namespace" => rendered.push_str(namespace),
            other => {
                return Err(AppError::Validation(format!(
                    "unknown placeholder '{other}' in access command '{pattern}'"
                )));
            }
        }

        rest = &after_open[end + 2..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}
