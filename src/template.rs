/// Fill the `{year}` and `{month}` placeholders of a url or filename template.
///
/// A placeholder can carry a width, `{month:02}` (or `{month:02d}`) renders
/// month 3 as `03`.  Doubled braces `{{` and `}}` stand for literal braces.
/// Anything else in braces is copied through untouched, so a template without
/// placeholders comes back as is.
pub fn render(template: &str, year: i64, month: i64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(start) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let field = &tail[1..end];
        if field.contains('{') {
            // a lone opening brace in front of a field, e.g. `{ {year}`
            out.push('{');
            rest = &tail[1..];
            continue;
        }
        match substitute(field, year, month) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn substitute(field: &str, year: i64, month: i64) -> Option<String> {
    let (name, spec) = field.split_once(':').unwrap_or((field, ""));
    let value = match name {
        "year" => year,
        "month" => month,
        _ => return None,
    };
    let spec = spec.strip_suffix('d').unwrap_or(spec);
    if spec.is_empty() {
        return Some(value.to_string());
    }
    if !spec.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width: usize = spec.parse().ok()?;
    if spec.starts_with('0') {
        Some(format!("{:0width$}", value))
    } else {
        Some(format!("{:>width$}", value))
    }
}
