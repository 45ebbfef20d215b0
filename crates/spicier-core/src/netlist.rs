//! SPICE netlist text utilities.
//!
//! The routing and rewriting stages never build a circuit; they only need to
//! look at netlist text one logical line at a time. A logical line is a
//! physical line plus any `+` continuation lines that follow it, with inline
//! comments removed.

/// A logical netlist line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line.
    pub number: usize,
    /// Joined text with inline comments stripped and surrounding whitespace trimmed.
    pub text: String,
}

impl LogicalLine {
    /// Lower-cased dot-command name (`.model`, `.include`, ...) if this is a directive.
    pub fn directive(&self) -> Option<String> {
        directive_name(&self.text)
    }

    /// First character of an element line, lower-cased (`m` for `M1 ...`).
    pub fn element_prefix(&self) -> Option<char> {
        let c = self.text.chars().next()?;
        if c.is_ascii_alphabetic() {
            Some(c.to_ascii_lowercase())
        } else {
            None
        }
    }
}

/// Whether a physical line is a full-line comment.
pub fn is_comment(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('*') || t.starts_with("//")
}

/// Remove `;` comments and ` $ ` style comments.
pub fn strip_inline_comment(line: &str) -> &str {
    let mut end = line.len();
    if let Some(pos) = line.find(';') {
        end = end.min(pos);
    }
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'$' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            end = end.min(i);
            break;
        }
    }
    &line[..end]
}

/// Split netlist text into logical lines, skipping blank and comment lines.
///
/// The title line is included; callers that follow the SPICE convention of a
/// mandatory title use [`split_title`] first.
pub fn logical_lines(text: &str) -> Vec<LogicalLine> {
    let mut lines: Vec<LogicalLine> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() || is_comment(raw) {
            continue;
        }
        let content = strip_inline_comment(raw).trim();
        if content.is_empty() {
            continue;
        }

        if let Some(rest) = content.strip_prefix('+') {
            if let Some(last) = lines.last_mut() {
                let rest = rest.trim();
                if !rest.is_empty() {
                    last.text.push(' ');
                    last.text.push_str(rest);
                }
                continue;
            }
        }

        lines.push(LogicalLine {
            number: idx + 1,
            text: content.to_string(),
        });
    }

    lines
}

/// Split off the first physical line as the netlist title.
pub fn split_title(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(pos) => (text[..pos].trim_end_matches('\r'), &text[pos + 1..]),
        None => (text, ""),
    }
}

/// Lower-cased directive name of a line starting with `.`.
pub fn directive_name(line: &str) -> Option<String> {
    let first = line.split_whitespace().next()?;
    if !first.starts_with('.') {
        return None;
    }
    // `.model` cards are sometimes written `.MODEL(`; cut at the first paren.
    let name = first.split('(').next().unwrap_or(first);
    Some(name.to_ascii_lowercase())
}

/// Split a line into whitespace-separated tokens, keeping quoted strings whole.
pub fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => {
                current.push(c);
                quote = None;
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                current.push(c);
                quote = Some(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Strip one level of matching single or double quotes.
pub fn unquote(token: &str) -> &str {
    let t = token.trim();
    for q in ['"', '\''] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

/// Kind of file-inclusion directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `.include path` / `.inc path`.
    Include,
    /// `.lib path section`.
    Library,
}

/// A parsed `.include` or `.lib` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub kind: IncludeKind,
    /// Target path exactly as written, quotes removed.
    pub path: String,
    /// Library section for `.lib path section`.
    pub section: Option<String>,
}

impl IncludeDirective {
    /// Render the directive with a replacement path, quoted.
    pub fn with_path(&self, path: &str) -> String {
        match (self.kind, &self.section) {
            (IncludeKind::Include, _) => format!(".include \"{}\"", path),
            (IncludeKind::Library, Some(section)) => format!(".lib \"{}\" {}", path, section),
            (IncludeKind::Library, None) => format!(".lib \"{}\"", path),
        }
    }
}

/// Parse an include or library directive.
///
/// A single-token `.lib name` is a section header inside a library file and
/// is not an inclusion, so it yields `None`.
pub fn parse_include(line: &str) -> Option<IncludeDirective> {
    let name = directive_name(line)?;
    let tokens = split_tokens(line);
    match name.as_str() {
        ".include" | ".inc" => {
            let path = tokens.get(1)?;
            Some(IncludeDirective {
                kind: IncludeKind::Include,
                path: unquote(path).to_string(),
                section: None,
            })
        }
        ".lib" if tokens.len() >= 3 => Some(IncludeDirective {
            kind: IncludeKind::Library,
            path: unquote(&tokens[1]).to_string(),
            section: Some(tokens[2].clone()),
        }),
        _ => None,
    }
}

/// A parsed `.model` card.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCard {
    /// Model name as written.
    pub name: String,
    /// Lower-cased model type (`nmos`, `d`, `bsimcmg`, ...).
    pub model_type: String,
    /// `LEVEL=` parameter when present.
    pub level: Option<f64>,
}

/// Parse a `.model name type [params]` card.
pub fn parse_model_card(line: &str) -> Option<ModelCard> {
    if directive_name(line)?.as_str() != ".model" {
        return None;
    }

    let normalized: String = line
        .chars()
        .map(|c| match c {
            '(' | ')' | ',' => ' ',
            _ => c,
        })
        .collect();
    let normalized = normalized.replace('=', " = ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let name = tokens.get(1)?.to_string();
    let model_type = tokens.get(2)?.to_ascii_lowercase();

    let level = tokens
        .windows(3)
        .find(|w| w[0].eq_ignore_ascii_case("level") && w[1] == "=")
        .and_then(|w| crate::units::parse_value(w[2]));

    Some(ModelCard {
        name,
        model_type,
        level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_lines_join_continuations() {
        let text = "Title\nR1 1 2\n+ 1k\n* comment\n\nC1 2 0 1p ; trailing\n";
        let lines = logical_lines(text);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].text, "R1 1 2 1k");
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[2].text, "C1 2 0 1p");
        assert_eq!(lines[2].number, 6);
    }

    #[test]
    fn test_dollar_comment_requires_whitespace() {
        assert_eq!(strip_inline_comment("R1 a b 1k $ load"), "R1 a b 1k ");
        assert_eq!(strip_inline_comment("R$1 a b 1k"), "R$1 a b 1k");
    }

    #[test]
    fn test_split_title() {
        let (title, body) = split_title("My Circuit\r\nR1 1 0 1k\n");
        assert_eq!(title, "My Circuit");
        assert_eq!(body, "R1 1 0 1k\n");
    }

    #[test]
    fn test_parse_include_variants() {
        let inc = parse_include(".include \"models/my lib.sp\"").unwrap();
        assert_eq!(inc.kind, IncludeKind::Include);
        assert_eq!(inc.path, "models/my lib.sp");

        let inc = parse_include(".INC ./a.mod").unwrap();
        assert_eq!(inc.path, "./a.mod");

        let lib = parse_include(".lib 'pdk/models.lib' tt").unwrap();
        assert_eq!(lib.kind, IncludeKind::Library);
        assert_eq!(lib.path, "pdk/models.lib");
        assert_eq!(lib.section.as_deref(), Some("tt"));
        assert_eq!(lib.with_path("/abs/models.lib"), ".lib \"/abs/models.lib\" tt");

        assert!(parse_include(".lib tt").is_none());
        assert!(parse_include("R1 1 0 1k").is_none());
    }

    #[test]
    fn test_parse_model_card() {
        let card = parse_model_card(".model M1 NMOS LEVEL=70").unwrap();
        assert_eq!(card.name, "M1");
        assert_eq!(card.model_type, "nmos");
        assert_eq!(card.level, Some(70.0));

        let card = parse_model_card(".MODEL nch nmos(level = 54 vth0=0.4)").unwrap();
        assert_eq!(card.model_type, "nmos");
        assert_eq!(card.level, Some(54.0));

        let card = parse_model_card(".model dx D(is=1e-14)").unwrap();
        assert_eq!(card.model_type, "d");
        assert_eq!(card.level, None);

        assert!(parse_model_card(".modelx foo").is_none());
    }
}
