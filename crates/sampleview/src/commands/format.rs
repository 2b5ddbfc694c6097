//! Display helpers shared by the text, JSON and CSV outputs.

use crate::profile::{FuncIndex, Thread, WeightType};

/// Format a function name - demangle, remove hash suffix and simplify
pub fn format_function(func: &str) -> String {
    let mut result = match rustc_demangle::try_demangle(func) {
        // The alternate form drops the "::h<hash>" suffix
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => func.to_string(),
    };

    // Already demangled names may still carry the hash
    if let Some(idx) = result.rfind("::h") {
        let suffix = &result[idx + 3..];
        if suffix.len() == 16 && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            result.truncate(idx);
        }
    }

    // Simplify trait impls: <Type as Trait>::method -> Type::method
    if result.starts_with('<')
        && let Some(as_pos) = result.find(" as ")
        && let Some(gt_pos) = result.find(">::")
        && as_pos < gt_pos
    {
        let impl_type = &result[1..as_pos];
        let method = &result[gt_pos + 3..];
        result = format!("{}::{}", simplify_type_path(impl_type), method);
    }

    let prefixes_to_shorten = [
        ("core::slice::sort::", "sort::"),
        ("core::ptr::", "ptr::"),
        ("core::fmt::", "fmt::"),
        ("core::iter::", "iter::"),
        ("alloc::vec::", "Vec::"),
        ("alloc::string::", "String::"),
        ("std::collections::hash_map::", "HashMap::"),
    ];
    for (prefix, replacement) in prefixes_to_shorten {
        if let Some(rest) = result.strip_prefix(prefix) {
            result = format!("{replacement}{rest}");
            break;
        }
    }

    // Collapse long generic parameter lists
    if let (Some(start), Some(end)) = (result.find('<'), result.rfind('>'))
        && start < end
    {
        let generic = &result[start..=end];
        if generic.len() > 20 || generic.contains("::") {
            result = format!("{}<_>{}", &result[..start], &result[end + 1..]);
        }
    }

    result
}

/// Simplify a type path to module::Type format
fn simplify_type_path(path: &str) -> String {
    let parts: Vec<&str> = path.split("::").collect();
    if parts.len() >= 2 {
        format!("{}::{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        path.to_string()
    }
}

/// Display name of `func` in `thread`.
pub fn function_name(thread: &Thread, func: FuncIndex) -> String {
    format_function(thread.func_name(func))
}

/// `file:line` of `func`, or its resource name, or nothing.
pub fn function_location(thread: &Thread, func: FuncIndex) -> String {
    let funcs = &thread.funcs;
    if let Some(file) = funcs.file_name[func] {
        let file = simplify_path(thread.strings.get_or_empty(file));
        return match funcs.line[func] {
            Some(line) if line > 0 => format!("{file}:{line}"),
            _ => file,
        };
    }
    funcs.resource[func]
        .map(|r| thread.strings.get_or_empty(thread.resources.name[r]).to_string())
        .unwrap_or_default()
}

/// Simplify a file path - extract the most meaningful part
fn simplify_path(path: &str) -> String {
    if let Some(idx) = path.find("/src/") {
        return path[idx + 1..].to_string();
    }
    if let Some((_, rest)) = path.split_once("://") {
        return rest.to_string();
    }
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// A weight in the unit `weight_type` gives it.
pub fn format_weight(weight: f64, weight_type: WeightType) -> String {
    match weight_type {
        WeightType::Samples => format_count(weight as i64),
        WeightType::TracingMs => format!("{weight:.1}ms"),
        WeightType::Bytes => format_bytes(weight as i64),
    }
}

/// Format bytes as human-readable with decimals (heaptrack style)
pub fn format_bytes(bytes: i64) -> String {
    let abs = bytes.unsigned_abs() as f64;
    let sign = if bytes < 0 { "-" } else { "" };
    if abs >= 1024.0 * 1024.0 * 1024.0 {
        format!("{}{:.2}G", sign, abs / (1024.0 * 1024.0 * 1024.0))
    } else if abs >= 1024.0 * 1024.0 {
        format!("{}{:.2}M", sign, abs / (1024.0 * 1024.0))
    } else if abs >= 1024.0 {
        format!("{}{:.1}K", sign, abs / 1024.0)
    } else {
        format!("{}{}B", sign, bytes.unsigned_abs())
    }
}

/// Format a number with commas for readability
pub fn format_count(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

pub fn percent(part: f64, total: f64) -> f64 {
    if total == 0.0 { 0.0 } else { part / total * 100.0 }
}

pub fn json_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn csv_escape(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangled_names_are_demangled() {
        assert_eq!(
            format_function("_ZN4core3fmt5write17h0123456789abcdefE"),
            "fmt::write"
        );
        assert_eq!(format_function("app::run::h0123456789abcdef"), "app::run");
        assert_eq!(format_function("js_function"), "js_function");
    }

    #[test]
    fn trait_impls_are_shortened() {
        assert_eq!(
            format_function("<app::cache::Lru as core::ops::Drop>::drop"),
            "cache::Lru::drop"
        );
    }

    #[test]
    fn weights_use_their_unit() {
        assert_eq!(format_weight(1234.0, WeightType::Samples), "1,234");
        assert_eq!(format_weight(2048.0, WeightType::Bytes), "2.0K");
        assert_eq!(format_weight(-12.0, WeightType::Bytes), "-12B");
        assert_eq!(format_weight(1.5, WeightType::TracingMs), "1.5ms");
        assert_eq!(format_count(-1000), "-1,000");
    }
}
