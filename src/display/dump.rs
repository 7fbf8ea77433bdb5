use crate::graph::{EntityAttrs, Link, NetworkDefinition};
use crate::validation::{FieldTable, Slot};
use crate::value::AttrValue;
use std::fmt::Write;

/// Renders a network definition as sorted, line-oriented text. Two renders
/// of equal definitions are byte-identical.
pub fn render(network: &NetworkDefinition) -> String {
    let mut dumper = Dumper { output: String::new() };
    dumper.header(network);

    for block in network.blocks.values() {
        let _ = writeln!(
            dumper.output,
            "block {} type={} connections={} subblocks={} flags={}",
            block.id,
            block.block_type,
            int_list(&block.connections),
            int_list(&block.subblocks),
            str_list(&block.flags),
        );
        dumper.attrs(&block.attrs);
    }

    for layer in network.all_layers() {
        let _ = writeln!(
            dumper.output,
            "layer {}.{} {} skip={} flags={}",
            layer.block_id,
            layer.index,
            layer.layer_type,
            int_list(&layer.skip_connections),
            str_list(&layer.flags),
        );
        dumper.table("params.", &layer.params);
        dumper.attrs(&layer.attrs);
    }

    for input in network.inputs.values() {
        let shape = AttrValue::List(input.shape.clone());
        let targets: Vec<String> = input.connections.iter().map(ToString::to_string).collect();
        let _ = writeln!(dumper.output, "input {} shape={} connections=[{}]", input.id, shape, targets.join(", "));
        dumper.attrs(&input.attrs);
    }

    for output in network.outputs.values() {
        let sources: Vec<String> = output.connections.iter().map(ToString::to_string).collect();
        let _ = writeln!(dumper.output, "output {} connections=[{}]", output.id, sources.join(", "));
        dumper.attrs(&output.attrs);
    }

    for (category, entities) in &network.aux {
        for entity in entities.values() {
            let _ = writeln!(dumper.output, "{} {}", category.name().to_lowercase(), entity.id);
            dumper.attrs(&entity.attrs);
        }
    }

    for record in &network.links {
        let endpoints = match &record.link {
            Link::SignalRoute { source, target } => format!("source={} target={}", source, target),
            Link::RecurrentConnection { from, to } => format!("from={} to={}", from, to),
            Link::ShapeConditional { layer } => format!("layer={}", layer),
        };
        let _ = writeln!(dumper.output, "link {} #{} {}", record.link.kind().name(), record.position, endpoints);
        dumper.attrs(&record.attrs);
    }

    dumper.output
}

struct Dumper {
    output: String,
}

impl Dumper {
    fn header(&mut self, network: &NetworkDefinition) {
        let _ = writeln!(
            self.output,
            "network blocks={} layers={} inputs={} outputs={} links={}",
            network.blocks.len(),
            network.all_layers().count(),
            network.inputs.len(),
            network.outputs.len(),
            network.links.len(),
        );
        for (key, value) in &network.meta {
            let _ = writeln!(self.output, "  meta {} = {}", key, value);
        }
    }

    fn table(&mut self, prefix: &str, table: &FieldTable) {
        for (name, slot) in table {
            match slot {
                Slot::Value(value) => {
                    let _ = writeln!(self.output, "  {}{} = {}", prefix, name, value);
                }
                Slot::Pending => {
                    let _ = writeln!(self.output, "  {}{} = <pending>", prefix, name);
                }
            }
        }
    }

    fn attrs(&mut self, attrs: &EntityAttrs) {
        self.table("", &attrs.fields);
        for reference in &attrs.references {
            let _ = writeln!(self.output, "  ref {} -> {}", reference.field, reference.target);
        }
        // Extensions keep arrival order.
        for (name, value) in attrs.extensions.iter() {
            let _ = writeln!(self.output, "  ext {} = {}", name, value);
        }
    }
}

fn int_list(items: &[i64]) -> String {
    let parts: Vec<String> = items.iter().map(i64::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn str_list(items: &[String]) -> String { format!("[{}]", items.join(", ")) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Block, EntityRef, Reference};

    #[test]
    fn test_render_lists_entities_in_id_order() {
        let mut network = NetworkDefinition::new();
        for id in [2, 0] {
            network.blocks.insert(
                id,
                Block {
                    id,
                    block_type: 0,
                    connections: vec![],
                    subblocks: vec![],
                    flags: vec![],
                    attrs: EntityAttrs {
                        references: vec![Reference { field: "connections[0]".into(), target: EntityRef::Block(9) }],
                        ..EntityAttrs::default()
                    },
                },
            );
        }
        let text = render(&network);
        let first = text.find("block 0").unwrap();
        let second = text.find("block 2").unwrap();
        assert!(first < second);
        assert!(text.contains("  ref connections[0] -> Block 9"));
        assert_eq!(text, render(&network.clone()));
    }
}
