use super::{Error, ErrorKind};

pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_CHARACTER: &str = "unexpected character";
pub const UNEXPECTED_EOF: &str = "unexpected end of template";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const INCOMPATIBLE_TYPES: &str = "incompatible types";

/// Return an [`Error`] explaining that the write operation failed.
///
/// This is likely caused by a failure during a `write!` macro operation.
pub fn error_write() -> Error {
    Error::new(ErrorKind::Write, "write failure")
        .with_help("failed to write result of render, are you low on memory?")
}

/// Return an [`Error`] describing a missing template.
pub fn error_missing_template(name: &str) -> Error {
    Error::new(
        ErrorKind::TemplateNotFound,
        format!("template `{name}` not found"),
    )
    .with_help("add it with `.add_template`, or configure a loader that can resolve it")
}

/// Return an [`Error`] describing a set of missing templates.
pub fn error_missing_templates(names: &[String]) -> Error {
    let list = names
        .iter()
        .map(|n| format!("`{n}`"))
        .collect::<Vec<_>>()
        .join(", ");

    Error::new(
        ErrorKind::TemplatesNotFound,
        format!("none of the templates given were found: {list}"),
    )
}

/// Return an [`Error`] describing an operation applied to the wrong types.
pub fn error_types<T>(help: T) -> Error
where
    T: Into<String>,
{
    Error::new(ErrorKind::Type, INCOMPATIBLE_TYPES).with_help(help)
}

/// Return an [`Error`] describing a denied operation.
pub fn error_security<T>(reason: T) -> Error
where
    T: Into<String>,
{
    Error::new(ErrorKind::Security, reason)
}

/// Describe a list of expected items as `a`, `b` or `c`.
pub fn one_of(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => format!("`{one}`"),
        [init @ .., last] => {
            let init = init
                .iter()
                .map(|i| format!("`{i}`"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{init} or `{last}`")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::one_of;

    #[test]
    fn test_one_of() {
        assert_eq!(one_of(&["endfor"]), "`endfor`");
        assert_eq!(one_of(&["endfor", "else"]), "`endfor` or `else`");
        assert_eq!(
            one_of(&["elif", "else", "endif"]),
            "`elif`, `else` or `endif`"
        );
    }
}
