// This module models the architecturally visible register file as a plain value. Rather
// than hand-writing one comparison routine per platform, each architecture publishes a
// fixed, ordered schema of named fields (general-purpose registers in platform order, the
// flags word, extra register files such as x86 opmask registers, the stack pointer, and the
// vector register array). MachineState stores the superset of storage any supported schema
// needs; compare_states walks a schema once and reports the first field that differs,
// which is what gives the integrity diagnostic its exact register name.

//! Machine state snapshots and per-architecture register schemas.

use super::error::StateMismatch;
use std::fmt;

/// Number of general-purpose register slots in a snapshot.
pub const NUM_GPR_SLOTS: usize = 32;
/// Number of extra (mask) register slots in a snapshot.
pub const NUM_EXTRA_SLOTS: usize = 8;
/// Number of vector register slots in a snapshot.
pub const NUM_SIMD_SLOTS: usize = 32;
/// Bytes stored per vector register slot.
pub const SIMD_SLOT_BYTES: usize = 64;

/// Target architecture of a thread's register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    AArch64,
}

impl Arch {
    /// Architecture of the running process.
    pub const fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::AArch64
        } else {
            Arch::X86_64
        }
    }

    /// Comparison schema for this architecture, in comparison order.
    pub fn schema(self) -> &'static [StateField] {
        match self {
            Arch::X86_64 => &crate::x64::regs::SCHEMA,
            Arch::AArch64 => &AARCH64_SCHEMA,
        }
    }

    /// Meaningful bytes in each vector register.
    pub const fn simd_bytes(self) -> usize {
        match self {
            Arch::X86_64 => 64,
            Arch::AArch64 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::AArch64 => "aarch64",
        }
    }
}

/// Where a schema field lives inside a [`MachineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLoc {
    Gpr(u8),
    Flags,
    Extra(u8),
    Sp,
    Simd(u8),
}

/// One named, comparable field of the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateField {
    pub name: &'static str,
    pub loc: FieldLoc,
}

impl StateField {
    pub const fn new(name: &'static str, loc: FieldLoc) -> Self {
        Self { name, loc }
    }
}

/// Value of one field, borrowed from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Word(u64),
    Vector(&'a [u8]),
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Word(v) => write!(f, "{v:#x}"),
            FieldValue::Vector(bytes) => {
                write!(f, "0x")?;
                // Most significant byte first.
                for b in bytes.iter().rev() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Complete copy of the architectural register file at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub gpr: [u64; NUM_GPR_SLOTS],
    pub flags: u64,
    pub extra: [u64; NUM_EXTRA_SLOTS],
    pub sp: u64,
    pub simd: [[u8; SIMD_SLOT_BYTES]; NUM_SIMD_SLOTS],
}

impl MachineState {
    pub const fn zeroed() -> Self {
        Self {
            gpr: [0; NUM_GPR_SLOTS],
            flags: 0,
            extra: [0; NUM_EXTRA_SLOTS],
            sp: 0,
            simd: [[0; SIMD_SLOT_BYTES]; NUM_SIMD_SLOTS],
        }
    }

    /// Read the field at `loc`, truncating vectors to `simd_bytes`.
    pub fn field(&self, loc: FieldLoc, simd_bytes: usize) -> FieldValue<'_> {
        match loc {
            FieldLoc::Gpr(i) => FieldValue::Word(self.gpr[i as usize]),
            FieldLoc::Flags => FieldValue::Word(self.flags),
            FieldLoc::Extra(i) => FieldValue::Word(self.extra[i as usize]),
            FieldLoc::Sp => FieldValue::Word(self.sp),
            FieldLoc::Simd(i) => FieldValue::Vector(&self.simd[i as usize][..simd_bytes]),
        }
    }

    /// Overwrite a word-sized field. Vector locations are ignored.
    pub fn set_word(&mut self, loc: FieldLoc, value: u64) {
        match loc {
            FieldLoc::Gpr(i) => self.gpr[i as usize] = value,
            FieldLoc::Flags => self.flags = value,
            FieldLoc::Extra(i) => self.extra[i as usize] = value,
            FieldLoc::Sp => self.sp = value,
            FieldLoc::Simd(_) => {}
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Look up a schema field by name.
pub fn find_field(arch: Arch, name: &str) -> Option<StateField> {
    arch.schema()
        .iter()
        .copied()
        .find(|f| f.name.eq_ignore_ascii_case(name))
}

/// Compare two snapshots field by field in schema order.
///
/// Returns the first field whose value differs.
pub fn compare_states(
    arch: Arch,
    instrumented: &MachineState,
    reexecuted: &MachineState,
) -> Result<(), StateMismatch> {
    let width = arch.simd_bytes();
    for field in arch.schema() {
        let got = instrumented.field(field.loc, width);
        let expected = reexecuted.field(field.loc, width);
        if got != expected {
            return Err(StateMismatch {
                field: field.name,
                instrumented: got.to_string(),
                reexecuted: expected.to_string(),
            });
        }
    }
    Ok(())
}

const fn aarch64_schema() -> [StateField; 65] {
    const GPR_NAMES: [&str; 30] = [
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
        "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
        "x27", "x28", "x29",
    ];
    const SIMD_NAMES: [&str; 32] = [
        "v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "v10", "v11", "v12", "v13",
        "v14", "v15", "v16", "v17", "v18", "v19", "v20", "v21", "v22", "v23", "v24", "v25", "v26",
        "v27", "v28", "v29", "v30", "v31",
    ];

    let mut out = [StateField::new("", FieldLoc::Flags); 65];
    let mut i = 0;
    while i < 30 {
        out[i] = StateField::new(GPR_NAMES[i], FieldLoc::Gpr(i as u8));
        i += 1;
    }
    out[30] = StateField::new("lr", FieldLoc::Gpr(30));
    out[31] = StateField::new("nzcv", FieldLoc::Flags);
    out[32] = StateField::new("sp", FieldLoc::Sp);
    let mut v = 0;
    while v < 32 {
        out[33 + v] = StateField::new(SIMD_NAMES[v], FieldLoc::Simd(v as u8));
        v += 1;
    }
    out
}

/// AArch64 comparison order: x0..x29, lr, nzcv, sp, v0..v31.
pub static AARCH64_SCHEMA: [StateField; 65] = aarch64_schema();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_states_compare_equal() {
        let mut a = MachineState::zeroed();
        a.gpr[3] = 0xdead_beef;
        a.simd[5][63] = 0x7f;
        let b = a;
        assert!(compare_states(Arch::X86_64, &a, &b).is_ok());
        assert!(compare_states(Arch::AArch64, &a, &b).is_ok());
    }

    #[test]
    fn test_mismatch_names_field() {
        let a = MachineState::zeroed();
        let mut b = a;
        b.gpr[30] = 1;
        let err = compare_states(Arch::AArch64, &a, &b).unwrap_err();
        assert_eq!(err.field, "lr");
        assert_eq!(err.instrumented, "0x0");
        assert_eq!(err.reexecuted, "0x1");
    }

    #[test]
    fn test_first_differing_field_in_schema_order() {
        let a = MachineState::zeroed();
        let mut b = a;
        b.simd[31][0] = 1;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "zmm31");
        b.sp = 8;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "rsp");
        b.extra[5] = 1;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "k5");
        b.flags = 0x40;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "rflags");
        // rax (gpr 0) precedes r15 but follows rdi (gpr 7) in comparison order.
        b.gpr[15] = 1;
        b.gpr[0] = 1;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "rax");
        b.gpr[7] = 1;
        assert_eq!(compare_states(Arch::X86_64, &a, &b).unwrap_err().field, "rdi");
    }

    #[test]
    fn test_aarch64_flags_precede_stack_pointer() {
        let a = MachineState::zeroed();
        let mut b = a;
        b.sp = 16;
        b.simd[0][0] = 1;
        assert_eq!(compare_states(Arch::AArch64, &a, &b).unwrap_err().field, "sp");
        b.flags = 1 << 30;
        assert_eq!(compare_states(Arch::AArch64, &a, &b).unwrap_err().field, "nzcv");
        b.gpr[29] = 1;
        assert_eq!(compare_states(Arch::AArch64, &a, &b).unwrap_err().field, "x29");
    }

    #[test]
    fn test_aarch64_ignores_upper_vector_bytes() {
        let a = MachineState::zeroed();
        let mut b = a;
        b.simd[0][40] = 9;
        assert!(compare_states(Arch::AArch64, &a, &b).is_ok());
        b.simd[0][15] = 9;
        assert_eq!(compare_states(Arch::AArch64, &a, &b).unwrap_err().field, "v0");
    }

    #[test]
    fn test_aarch64_schema_order() {
        let names: Vec<_> = AARCH64_SCHEMA.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), 65);
        assert_eq!(&names[..2], &["x0", "x1"]);
        assert_eq!(&names[29..34], &["x29", "lr", "nzcv", "sp", "v0"]);
        assert_eq!(names[64], "v31");
    }

    #[test]
    fn test_vector_display_is_big_endian() {
        let bytes = [0x01, 0x02];
        assert_eq!(FieldValue::Vector(&bytes).to_string(), "0x0201");
        assert_eq!(FieldValue::Word(255).to_string(), "0xff");
    }

    #[test]
    fn test_find_field() {
        let f = find_field(Arch::AArch64, "SP").unwrap();
        assert_eq!(f.loc, FieldLoc::Sp);
        assert!(find_field(Arch::AArch64, "rax").is_none());
    }
}
