//! Structured shell commands.
//!
//! Option builders only ever push typed arguments. Quoting happens in one
//! place, when a command is rendered into the script handed to `sh -c`.

const REDACTED: &str = "********";

/// How an interpolated value is protected from the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// `'value'`, embedded single quotes closed and re-opened.
    Single,
    /// `"value"`, with `\ " $` and backticks escaped.
    Double,
    /// Backslash-escaping of everything outside a conservative safe set.
    Escaped,
}

impl Quote {
    pub fn apply(self, value: &str) -> String {
        match self {
            Quote::Single => format!("'{}'", value.replace('\'', r"'\''")),
            Quote::Double => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('"');
                for c in value.chars() {
                    if matches!(c, '\\' | '"' | '$' | '`') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
                out
            }
            Quote::Escaped => escape(value),
        }
    }
}

fn escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' | '-' | '.' | ',' | ':' | '+' | '/' | '@' => out.push(c),
            '\n' => out.push_str("'\n'"),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    /// Emitted verbatim. Only for fixed flags and user passthrough fragments.
    Raw(String),
    Value(String, Quote),
    Opt { name: String, value: String, quote: Quote },
    Secret { name: String, value: String },
}

impl Arg {
    fn render(&self, redact: bool) -> String {
        match self {
            Arg::Raw(fragment) => fragment.clone(),
            Arg::Value(value, quote) => quote.apply(value),
            Arg::Opt { name, value, quote } => format!("{}={}", name, quote.apply(value)),
            Arg::Secret { name, .. } if redact => format!("{}={}", name, REDACTED),
            Arg::Secret { name, value } => format!("{}={}", name, escape(value)),
        }
    }
}

/// One program invocation inside a stage script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<Arg>,
    discard_stderr: bool,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ShellCommand {
            program: program.into(),
            args: Vec::new(),
            discard_stderr: false,
        }
    }

    /// Fixed flag or passthrough fragment. Blank fragments are dropped.
    pub fn raw(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            self.args.push(Arg::Raw(trimmed.to_string()));
        }
        self
    }

    pub fn raws<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fragments.into_iter().fold(self, |cmd, f| cmd.raw(f))
    }

    pub fn value(mut self, value: impl Into<String>, quote: Quote) -> Self {
        self.args.push(Arg::Value(value.into(), quote));
        self
    }

    pub fn opt(mut self, name: impl Into<String>, value: impl Into<String>, quote: Quote) -> Self {
        self.args.push(Arg::Opt {
            name: name.into(),
            value: value.into(),
            quote,
        });
        self
    }

    /// `name=value` whose value is masked in redacted renderings.
    pub fn secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push(Arg::Secret {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Send the command's stderr to `/dev/null`.
    pub fn discard_stderr(mut self, discard: bool) -> Self {
        self.discard_stderr = discard;
        self
    }

    #[cfg(test)]
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn render(&self) -> String {
        self.render_with(false)
    }

    pub fn render_redacted(&self) -> String {
        self.render_with(true)
    }

    fn render_with(&self, redact: bool) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        parts.push(escape(&self.program));
        parts.extend(self.args.iter().map(|arg| arg.render(redact)));
        if self.discard_stderr {
            parts.push("2>/dev/null".to_string());
        }
        parts.join(" ")
    }
}

/// Commands joined by `&&`: each runs only if the previous one succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellScript {
    commands: Vec<ShellCommand>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, command: ShellCommand) -> Self {
        self.commands.push(command);
        self
    }

    #[cfg(test)]
    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }

    pub fn render(&self) -> String {
        self.join(ShellCommand::render)
    }

    pub fn render_redacted(&self) -> String {
        self.join(ShellCommand::render_redacted)
    }

    fn join(&self, render: fn(&ShellCommand) -> String) -> String {
        self.commands.iter().map(render).collect::<Vec<_>>().join(" && ")
    }
}

impl From<ShellCommand> for ShellScript {
    fn from(command: ShellCommand) -> Self {
        ShellScript::new().then(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_quotes_close_and_reopen() {
        assert_eq!(Quote::Single.apply("shop.orders"), "'shop.orders'");
        assert_eq!(Quote::Single.apply("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_double_quotes_escape_expansions() {
        assert_eq!(Quote::Double.apply("/x"), "\"/x\"");
        assert_eq!(Quote::Double.apply("a$b\"c"), "\"a\\$b\\\"c\"");
    }

    #[test]
    fn test_escaped_leaves_safe_chars_alone() {
        assert_eq!(Quote::Escaped.apply("root@local-1.x"), "root@local-1.x");
        assert_eq!(Quote::Escaped.apply("p a;ss"), r"p\ a\;ss");
        assert_eq!(Quote::Escaped.apply(""), "''");
    }

    #[test]
    fn test_command_renders_args_in_push_order() {
        let cmd = ShellCommand::new("/usr/bin/mysqldump")
            .raws(["--single-transaction", "  "])
            .secret("--password", "s3cr$t")
            .opt("--host", "db1", Quote::Single)
            .value("shop", Quote::Escaped)
            .discard_stderr(true);

        assert_eq!(
            cmd.render(),
            r"/usr/bin/mysqldump --single-transaction --password=s3cr\$t --host='db1' shop 2>/dev/null"
        );
        assert_eq!(
            cmd.render_redacted(),
            "/usr/bin/mysqldump --single-transaction --password=******** --host='db1' shop 2>/dev/null"
        );
    }

    #[test]
    fn test_script_joins_with_and() {
        let script = ShellScript::new()
            .then(ShellCommand::new("true"))
            .then(ShellCommand::new("echo").value("done", Quote::Escaped));
        assert_eq!(script.render(), "true && echo done");
        assert_eq!(script.commands().len(), 2);
    }
}
