//! End-to-end check that generation from a JSON memory map is deterministic:
//! running it twice over the same input produces byte-identical binary and
//! textually identical assembly.

use std::process::Command;

use tempfile::tempdir;

const CONFIG: &str = r#"
{
    // sample memory map used by the idempotence test
    "pagetables": [
        {
            "table_base_addr": "0x80000000",
            "excepiton_level": 1,
            "granule": "4K",
            "table_region_size": 32,
            "large_page": false,
            "gen_table_runtime": true,
            "maps": [
                {
                    "va": "0x40000000",
                    "pa": "0x40000000",
                    "size": "1G",
                    "type": "NORMAL",
                    "attr": "",
                    "description": "dram"
                },
                {
                    "va": "0x09000000",
                    "pa": "0x09000000",
                    "size": "4K",
                    "type": "DEVICE_nGnRnE",
                    "attr": "!x!s",
                    "description": "uart"
                }
            ]
        }
    ]
}
"#;

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_pgtt")
}

#[test]
fn generation_is_idempotent() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, CONFIG).unwrap();

    let run = |label: &str| {
        let out_bin = dir.path().join(format!("{label}.bin"));
        let out_asm = dir.path().join(format!("{label}.S"));
        let status = Command::new(bin_path())
            .arg("--config")
            .arg(&config_path)
            .arg("--out-bin")
            .arg(&out_bin)
            .arg("--out-asm")
            .arg(&out_asm)
            .status()
            .expect("failed to run pgtt");
        assert!(status.success());
        (
            std::fs::read(&out_bin).unwrap(),
            std::fs::read_to_string(&out_asm).unwrap(),
        )
    };

    let (bin_a, asm_a) = run("a");
    let (bin_b, asm_b) = run("b");

    assert_eq!(bin_a, bin_b);
    assert_eq!(asm_a, asm_b);
    assert!(!bin_a.is_empty());
    assert!(asm_a.contains("mmu_on:"));
}
