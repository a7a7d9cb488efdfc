//! Node types understood by the CPU backend.

use texgraph_core::{GraphError, SlotDef, TypeDescriptor, TypeRegistry};

fn descriptors() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::new("constant", "Constant", "constant").with_input(SlotDef::number("value", 0.5)),
        TypeDescriptor::new("gradient", "Gradient", "gradient")
            .with_input(SlotDef::string("direction", "horizontal")),
        TypeDescriptor::new("checker", "Checker", "checker").with_input(SlotDef::number("cells", 8.0)),
        TypeDescriptor::new("noise", "Noise", "noise").with_input(SlotDef::number("seed", 0.0)),
        TypeDescriptor::new("blend", "Blend", "blend")
            .with_input(SlotDef::texture("a"))
            .with_input(SlotDef::texture("b"))
            .with_input(SlotDef::number("mix", 0.5))
            .with_input(SlotDef::string("mode", "mix")),
        TypeDescriptor::new("invert", "Invert", "invert").with_input(SlotDef::texture("in")),
        TypeDescriptor::new("levels", "Levels", "levels")
            .with_input(SlotDef::texture("in"))
            .with_input(SlotDef::number("low", 0.0))
            .with_input(SlotDef::number("high", 1.0))
            .with_input(SlotDef::number("gamma", 1.0)),
    ]
}

pub fn builtin_types() -> Result<TypeRegistry, GraphError> {
    let mut registry = TypeRegistry::new();
    for descriptor in descriptors() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}
