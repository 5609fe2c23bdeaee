use crate::{ColumnSpec, ScalarType, SchemaError, SheetSchema};
use std::fmt::Write as _;

/// Leading statements of every generated schema document.
pub const DOCUMENT_HEADER: &str = "syntax = \"proto3\";\n\npackage conf;\n";

/// Renders one `message { ... }` block, fields in column order.
pub fn render_message(schema: &SheetSchema) -> String {
    let mut out = format!("message {} {{\n", schema.message_name);
    for col in &schema.columns {
        let label = if col.repeated { "repeated " } else { "" };
        let _ = writeln!(
            out,
            "  {label}{} {} = {};",
            col.scalar.proto_name(),
            col.name,
            col.field_id
        );
    }
    out.push_str("}\n");
    out
}

/// Renders a full document: header, then every message sorted by name.
pub fn render_document<'a, I>(schemas: I) -> String
where
    I: IntoIterator<Item = &'a SheetSchema>,
{
    let mut sorted: Vec<&SheetSchema> = schemas.into_iter().collect();
    sorted.sort_by(|a, b| a.message_name.cmp(&b.message_name));

    let mut out = String::from(DOCUMENT_HEADER);
    for schema in sorted {
        out.push('\n');
        out.push_str(&render_message(schema));
    }
    out
}

/// Parses every message of a schema document.
///
/// Understands the subset [`render_document`] emits: `syntax`, `package`,
/// `option` and `import` lines are skipped, `//` comments are ignored, and
/// each message holds `[repeated] <type> <name> = <id>;` fields.
pub fn parse_document(text: &str) -> Result<Vec<SheetSchema>, SchemaError> {
    let tokens = tokenize(text);
    let mut pos = 0;
    let mut out = Vec::new();

    while pos < tokens.len() {
        let (line, tok) = &tokens[pos];
        match tok.as_str() {
            ";" => pos += 1,
            "message" => {
                let (schema, next) = parse_message(&tokens, pos + 1, *line)?;
                out.push(schema);
                pos = next;
            }
            other => {
                return Err(SchemaError::Parse {
                    line: *line,
                    detail: format!("unexpected token {other:?}"),
                })
            }
        }
    }
    Ok(out)
}

/// Parses `text` and returns the message called `name`.
pub fn find_message(text: &str, name: &str) -> Result<SheetSchema, SchemaError> {
    parse_document(text)?
        .into_iter()
        .find(|s| s.message_name == name)
        .ok_or_else(|| SchemaError::MessageNotFound(name.to_string()))
}

type Token = (usize, String);

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split("//").next().unwrap_or("").trim();
        let first = line.split_whitespace().next().unwrap_or("");
        if matches!(first, "syntax" | "package" | "option" | "import") {
            continue;
        }
        let spaced = line
            .replace('{', " { ")
            .replace('}', " } ")
            .replace(';', " ; ")
            .replace('=', " = ");
        tokens.extend(spaced.split_whitespace().map(|t| (idx + 1, t.to_string())));
    }
    tokens
}

fn expect<'t>(tokens: &'t [Token], pos: usize, last_line: usize, what: &str) -> Result<&'t Token, SchemaError> {
    tokens.get(pos).ok_or_else(|| SchemaError::Parse {
        line: last_line,
        detail: format!("unexpected end of document, expected {what}"),
    })
}

fn parse_message(tokens: &[Token], mut pos: usize, line: usize) -> Result<(SheetSchema, usize), SchemaError> {
    let (_, name) = expect(tokens, pos, line, "message name")?;
    pos += 1;
    let (brace_line, brace) = expect(tokens, pos, line, "'{'")?;
    if brace != "{" {
        return Err(SchemaError::Parse {
            line: *brace_line,
            detail: format!("expected '{{' after message {name}, found {brace:?}"),
        });
    }
    pos += 1;

    let mut columns = Vec::new();
    loop {
        let (tok_line, tok) = expect(tokens, pos, line, "field or '}'")?;
        if tok == "}" {
            return Ok((SheetSchema::new(name.clone(), columns), pos + 1));
        }
        let (col, next) = parse_field(tokens, pos, *tok_line)?;
        columns.push(col);
        pos = next;
    }
}

fn parse_field(tokens: &[Token], mut pos: usize, line: usize) -> Result<(ColumnSpec, usize), SchemaError> {
    let err = |detail: String| SchemaError::Parse { line, detail };

    let mut repeated = false;
    let mut ty: &str = &expect(tokens, pos, line, "field type")?.1;
    if ty == "repeated" {
        repeated = true;
        pos += 1;
        ty = &expect(tokens, pos, line, "field type")?.1;
    }
    let scalar = ScalarType::from_proto_name(ty).ok_or_else(|| err(format!("unsupported field type {ty:?}")))?;
    pos += 1;

    let (_, name) = expect(tokens, pos, line, "field name")?;
    pos += 1;
    if expect(tokens, pos, line, "'='")?.1 != "=" {
        return Err(err(format!("expected '=' after field {name}")));
    }
    pos += 1;
    let (_, raw_id) = expect(tokens, pos, line, "field id")?;
    let field_id: u32 = raw_id
        .parse()
        .map_err(|_| err(format!("invalid field id {raw_id:?} for field {name}")))?;
    pos += 1;
    if expect(tokens, pos, line, "';'")?.1 != ";" {
        return Err(err(format!("expected ';' after field {name}")));
    }

    Ok((
        ColumnSpec {
            name: name.clone(),
            scalar,
            repeated,
            field_id,
        },
        pos + 1,
    ))
}
