//! Minimal scanner for global GLSL declarations.
//!
//! Finds `uniform`, `in` and `out` declarations at global scope, which is all
//! the backends need to reflect the interface of the programs this crate
//! builds. Interface blocks and anything inside function bodies are ignored.
use crate::gl::GlslType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Uniform,
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub storage: Storage,
    pub ty: GlslType,
    pub name: String,
    pub array_size: i32,
    pub location: Option<i32>,
}

/// Lists global declarations in source order.
pub fn scan_declarations(source: &str) -> Vec<Declaration> {
    let code = strip_comments(source);
    let code: String = code
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    code.split(';')
        .filter_map(|statement| {
            let tail = statement
                .rfind(['{', '}'])
                .map(|index| &statement[index + 1..])
                .unwrap_or(statement);
            parse_statement(tail.trim())
        })
        .collect()
}

/// Lines (1-based) holding an `#error` directive, with their message.
pub fn error_directives(source: &str) -> Vec<(usize, String)> {
    source
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let rest = line.trim_start().strip_prefix('#')?.trim_start();
            let message = rest.strip_prefix("error")?;
            Some((index + 1, message.trim().to_string()))
        })
        .collect()
}

fn parse_statement(statement: &str) -> Option<Declaration> {
    let (location, rest) = split_layout(statement);
    let mut tokens = rest.split_whitespace().peekable();
    let storage = match tokens.next()? {
        "uniform" => Storage::Uniform,
        "in" => Storage::In,
        "out" => Storage::Out,
        _ => return None,
    };
    while let Some(&token) = tokens.peek() {
        if matches!(token, "highp" | "mediump" | "lowp" | "flat" | "smooth") {
            tokens.next();
        } else {
            break;
        }
    }
    let ty = GlslType::from_glsl(tokens.next()?)?;
    let declarator: String = tokens.collect::<Vec<_>>().join("");
    let (name, array_size) = match declarator.split_once('[') {
        Some((name, size)) => (name, size.trim_end_matches(']').trim().parse().ok()?),
        None => (declarator.as_str(), 1),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(Declaration {
        storage,
        ty,
        name: name.to_string(),
        array_size,
        location,
    })
}

fn split_layout(statement: &str) -> (Option<i32>, &str) {
    let Some(rest) = statement.strip_prefix("layout") else {
        return (None, statement);
    };
    let Some(open) = rest.find('(') else {
        return (None, statement);
    };
    let Some(close) = rest.find(')') else {
        return (None, statement);
    };
    let location = rest[open + 1..close].split(',').find_map(|qualifier| {
        let (key, value) = qualifier.split_once('=')?;
        (key.trim() == "location")
            .then(|| value.trim().parse().ok())
            .flatten()
    });
    (location, rest[close + 1..].trim_start())
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut previous = ' ';
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                }
                if previous == '*' && next == '/' {
                    break;
                }
                previous = next;
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_uniforms_and_outputs() {
        let source = "#version 330 core\n\
            uniform vec3 iResolution;\n\
            uniform float iChannelTime[4];\n\
            // uniform float commented;\n\
            uniform sampler2D iChannel0; /* inline */\n\
            layout(location = 2) out vec4 fragColor;\n\
            void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n\
            void main(void) { mainImage(fragColor, gl_FragCoord.xy); }\n";
        let decls = scan_declarations(source);
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["iResolution", "iChannelTime", "iChannel0", "fragColor"]
        );
        assert_eq!(decls[1].array_size, 4);
        assert_eq!(decls[2].ty, GlslType::Sampler2D);
        assert_eq!(decls[3].storage, Storage::Out);
        assert_eq!(decls[3].location, Some(2));
    }

    #[test]
    fn reports_error_directives_with_lines() {
        let source = "void a();\n#error broken here\n";
        assert_eq!(error_directives(source), vec![(2, "broken here".to_string())]);
    }
}
