//! Graphviz DOT visualization of the consumer/library inclusion graph.
//!
//! Uses the `std::fmt::Write` trait for clean string formatting.

use std::fmt::Write;

use crate::builder::Analysis;
use crate::leak::Inclusion;

/// Quotes an ID for DOT. Backslashes are kept so `\n` still breaks label lines.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

/// Generate a Graphviz DOT representation of an analysis.
///
/// - libraries are boxes: lightgreen when consistent, lightcoral with conflicts
/// - consumers are ellipses: lightblue when clean, lightcoral when leaking
/// - solid edges include a library's public headers, dashed edges include
///   one of its units as text, dotted edges are library dependencies
/// - red edges carry the names a consumer leaks from a library
pub fn generate_dot(analysis: &Analysis) -> String {
    let mut dot = String::with_capacity(
        (analysis.libraries.len() + analysis.consumers.len()) * 80
            + analysis.dependencies.len() * 40
            + 150,
    );

    if let Err(e) = write_dot_content(&mut dot, analysis) {
        tracing::error!(detail = %e, "failed to generate DOT string");
        return "digraph macvis {\n}\n".to_string();
    }

    dot
}

fn write_dot_content(dot: &mut String, analysis: &Analysis) -> std::fmt::Result {
    writeln!(dot, "digraph macvis {{")?;
    writeln!(dot, "  rankdir=LR;")?;
    writeln!(dot, "  node [style=filled, fontname=\"JetBrains Mono\"];")?;
    writeln!(dot)?;

    // 1. Library nodes
    for lib in &analysis.libraries {
        let color = if lib.is_consistent() {
            "lightgreen"
        } else {
            "lightcoral"
        };
        writeln!(
            dot,
            "  {} [shape=box, fillcolor={}, label={}];",
            quote(&lib.name),
            color,
            quote(&format!(
                "{}\\n{} public / {} internal",
                lib.name,
                lib.public.len(),
                lib.internal.len()
            ))
        )?;
    }

    // 2. Consumer nodes
    for consumer in &analysis.consumers {
        let color = if consumer.leaks.is_empty() {
            "lightblue"
        } else {
            "lightcoral"
        };
        writeln!(
            dot,
            "  {} [shape=ellipse, fillcolor={}];",
            quote(&consumer.consumer.display().to_string()),
            color
        )?;
    }

    writeln!(dot)?;

    // 3. Dependencies
    for (lib, dep) in &analysis.dependencies {
        writeln!(dot, "  {} -> {} [style=dotted];", quote(lib), quote(dep))?;
    }

    // 4. Inclusions and leaks
    for consumer in &analysis.consumers {
        let from = quote(&consumer.consumer.display().to_string());
        for inclusion in &consumer.inclusions {
            match inclusion {
                Inclusion::Library(name) => writeln!(dot, "  {} -> {};", from, quote(name))?,
                Inclusion::Unit { library, path } => writeln!(
                    dot,
                    "  {} -> {} [style=dashed, label={}];",
                    from,
                    quote(library),
                    quote(&path.display().to_string())
                )?,
            }
        }

        for library in &consumer.relevant {
            let leaked: Vec<&str> = consumer
                .leaks
                .iter()
                .filter(|l| &l.library == library)
                .map(|l| l.name.as_str())
                .collect();
            if !leaked.is_empty() {
                writeln!(
                    dot,
                    "  {} -> {} [color=red, fontcolor=red, label={}];",
                    from,
                    quote(library),
                    quote(&leaked.join("\\n"))
                )?;
            }
        }
    }

    writeln!(dot, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::graph::DependencyGraph;
    use crate::leak::detect_leaks;
    use crate::scope::{FileRole, ScopeRule};
    use crate::table::build_unit;
    use std::path::{Path, PathBuf};

    fn analysis() -> Analysis {
        let rule = ScopeRule::default();
        let unit = build_unit(
            Path::new("lib.c"),
            FileRole::Source,
            "#define LIB_INTERNAL_DEBUG 1\n#define LIB_PUBLIC_VERSION_MAJOR 2\n",
            &rule,
        )
        .0;
        let libraries = vec![classify("lib", vec![unit], &rule)];
        let no_deps: Vec<String> = Vec::new();
        let graph = DependencyGraph::build([("lib", no_deps.as_slice())]).unwrap();
        let consumer = detect_leaks(
            Path::new("main.c"),
            vec![
                Inclusion::Library("lib".into()),
                Inclusion::Unit {
                    library: "lib".into(),
                    path: PathBuf::from("lib.c"),
                },
            ],
            &libraries,
            &graph,
        );
        Analysis {
            libraries,
            consumers: vec![consumer],
            dependencies: Vec::new(),
            build_order: vec!["lib".to_string()],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_generate_dot_empty() {
        let empty = Analysis {
            libraries: Vec::new(),
            consumers: Vec::new(),
            dependencies: Vec::new(),
            build_order: Vec::new(),
            warnings: Vec::new(),
        };
        let dot = generate_dot(&empty);
        assert!(dot.contains("digraph macvis"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("JetBrains Mono"));
    }

    #[test]
    fn test_generate_dot_highlights_leak() {
        let dot = generate_dot(&analysis());
        assert!(dot.contains("\"lib\" [shape=box, fillcolor=lightgreen"));
        assert!(dot.contains("\"main.c\" [shape=ellipse, fillcolor=lightcoral]"));
        assert!(dot.contains("\"main.c\" -> \"lib\";"));
        assert!(dot.contains("\"main.c\" -> \"lib\" [style=dashed, label=\"lib.c\"];"));
        assert!(dot.contains("[color=red, fontcolor=red, label=\"LIB_INTERNAL_DEBUG\"]"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
