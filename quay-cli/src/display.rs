//! Terminal rendering of plans, apply results and outputs

use std::collections::BTreeMap;

use colored::{ColoredString, Colorize};

use quay_core::declaration::Declaration;
use quay_core::effect::Effect;
use quay_core::graph::DependencyGraph;
use quay_core::interpreter::ApplyResult;
use quay_core::plan::Plan;
use quay_core::resource::Value;

fn colored_symbol(effect: &Effect) -> ColoredString {
    match effect {
        Effect::Create(_) => effect.symbol().green().bold(),
        Effect::Update { .. } => effect.symbol().yellow().bold(),
        Effect::Replace { .. } => effect.symbol().magenta().bold(),
        Effect::Delete { .. } => effect.symbol().red().bold(),
    }
}

pub fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let id = effect.resource_id();
        if matches!(effect, Effect::Delete { .. }) && plan.is_replaced(id) {
            println!(
                "  {} {} {}",
                colored_symbol(effect),
                id,
                "(replaced below)".dimmed()
            );
        } else {
            println!("  {} {}", colored_symbol(effect), id);
        }
        match effect {
            Effect::Create(resource) => {
                let attributes: BTreeMap<_, _> = resource.attributes.iter().collect();
                for (key, value) in attributes {
                    println!("      {}: {}", key, format_value(value));
                }
            }
            Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            }
            | Effect::Replace {
                from,
                to,
                changed_attributes,
                ..
            } => {
                for key in changed_attributes {
                    let before = from
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    let after = to
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!("      {}: {} → {}", key, before.red(), after.green());
                }
            }
            Effect::Delete { from, .. } => {
                if let Some(identifier) = &from.identifier {
                    println!("      {}", identifier.dimmed());
                }
            }
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

/// Per-effect results, in plan order
pub fn print_apply_result(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(_) => println!("  {} {}", "✓".green(), effect),
            Err(e) => println!("  {} {} - {}", "✗".red(), effect, e.message),
        }
    }

    let not_attempted = plan.effects().len().saturating_sub(result.outcomes.len());
    if not_attempted > 0 {
        println!(
            "  {}",
            format!("{} remaining changes not attempted", not_attempted).yellow()
        );
    }
}

/// Resources in apply or teardown order with their dependencies
pub fn print_graph(declaration: &Declaration, graph: &DependencyGraph, order: &[String], destroy: bool) {
    let title = if destroy { "Teardown order:" } else { "Apply order:" };
    println!("{}", title.cyan().bold());
    println!();

    for (index, binding) in order.iter().enumerate() {
        let resource_type = declaration
            .find(binding)
            .map(|r| r.id.resource_type.as_str())
            .unwrap_or("?");
        println!(
            "  {:>3}. {} {}",
            index + 1,
            binding.bold(),
            format!("({})", resource_type).dimmed()
        );

        let related: Vec<&str> = if destroy {
            graph.dependents_of(binding).iter().map(String::as_str).collect()
        } else {
            graph.dependency_targets(binding).into_iter().collect()
        };
        if !related.is_empty() {
            let label = if destroy { "after" } else { "needs" };
            println!("       {} {}", label.dimmed(), related.join(", "));
        }
    }
}

pub fn print_outputs(outputs: &BTreeMap<String, serde_json::Value>) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("{}", "Outputs:".cyan().bold());
    for (name, value) in outputs {
        let shown = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {} = {}", name.bold(), shown);
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            let strs: Vec<_> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{}", binding, attr),
        Value::Concat(parts) => {
            let strs: Vec<_> = parts.iter().map(format_value).collect();
            strs.join(" + ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_render_like_literals() {
        assert_eq!(format_value(&Value::string("10.0.0.0/16")), "\"10.0.0.0/16\"");
        assert_eq!(format_value(&Value::Int(8501)), "8501");
        assert_eq!(
            format_value(&Value::reference("load_balancer", "dns_name")),
            "load_balancer.dns_name"
        );
        assert_eq!(
            format_value(&Value::map([
                ("b", Value::Bool(true)),
                ("a", Value::strings(["x", "y"])),
            ])),
            "{a: [\"x\", \"y\"], b: true}"
        );
        assert_eq!(
            format_value(&Value::Concat(vec![
                Value::string("http://"),
                Value::reference("load_balancer", "dns_name"),
            ])),
            "\"http://\" + load_balancer.dns_name"
        );
    }
}
