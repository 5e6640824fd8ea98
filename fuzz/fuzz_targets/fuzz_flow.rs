#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // One-shot entry point with default limits: must never panic.
    let _ = asm_flow::assemble_str(data);

    // Tight limits, with the input also reachable through `!source`.
    let mut asm = asm_flow::Assembler::new();
    asm.limits(asm_flow::ResourceLimits {
        max_source_depth: 4,
        max_macro_depth: 4,
        max_iterations: 256,
        max_errors: 8,
        max_passes: 3,
    });
    asm.with_loader(
        asm_flow::MemoryLoader::new()
            .file("main.a", "!src \"fuzz.a\"\n!if 1 { !src \"fuzz.a\" }\n")
            .file("fuzz.a", data),
    );
    let _ = asm.assemble_file("main.a");
});
