//! Layout properties of duplicated blocks.

mod common;

use iced_x86::code_asm::*;
use iced_x86::{FlowControl, IcedError, Instruction};
use proptest::prelude::*;
use statecmp::core::{duplicate_block, Instr, InstrList, MarkerKind, MarkerRegistry, Note};

fn assemble(f: impl FnOnce(&mut CodeAssembler) -> Result<(), IcedError>) -> Vec<Instruction> {
    let mut a = CodeAssembler::new(64).unwrap();
    f(&mut a).unwrap();
    a.instructions().to_vec()
}

fn markers() -> MarkerRegistry {
    MarkerRegistry::with_base(Note(0x200))
}

/// Interleave a meta `inc r11` after every application instruction.
fn instrumented(app: &[Instruction]) -> InstrList {
    let counter = assemble(|a| a.inc(r11))[0];
    let mut bb = InstrList::from_app(app.iter().copied());
    let ids: Vec<_> = bb.iter().map(|i| i.id()).collect();
    for id in ids {
        bb.insert_after(id, Instr::meta(counter));
    }
    bb
}

/// Application instructions between `from` (exclusive) and `to` (exclusive).
fn app_between(bb: &InstrList, from: usize, to: usize) -> Vec<Instruction> {
    bb.iter()
        .skip(from + 1)
        .take(to - from - 1)
        .filter(|i| i.is_app())
        .filter_map(|i| i.machine().copied())
        .collect()
}

fn blocks_with_terminator() -> Vec<Vec<Instruction>> {
    vec![
        assemble(|a| a.ret()),
        assemble(|a| {
            a.mov(rax, rbx)?;
            a.add(rax, rcx)?;
            a.ret()
        }),
        assemble(|a| {
            a.cmp(rdi, rsi)?;
            a.jne(0x401000u64)
        }),
        assemble(|a| {
            a.xor(eax, eax)?;
            a.lea(rdx, ptr(rax + rcx * 4 + 8))?;
            a.sub(rdx, 3)?;
            a.jmp(0x402000u64)
        }),
    ]
}

#[test]
fn test_terminator_blocks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let markers = markers();

    for app in blocks_with_terminator() {
        let n = app.len();
        let (body, term) = app.split_at(n - 1);
        let mut bb = instrumented(&app);

        let layout = duplicate_block(&markers, &mut bb).unwrap();
        assert!(layout.relocated_terminator);

        let found = markers.scan(&bb);
        let kinds: Vec<_> = found.iter().map(|&(_, k)| k).collect();
        assert_eq!(
            kinds,
            vec![MarkerKind::OriginalStart, MarkerKind::CopyStart, MarkerKind::Terminator]
        );

        let orig = bb.position(layout.original_start).unwrap();
        let copy = bb.position(layout.copy_start).unwrap();
        let term_pos = bb.position(layout.terminator).unwrap();

        // The original region keeps everything except the terminator.
        assert_eq!(app_between(&bb, orig, copy), body);
        // The copy region holds the full application sequence.
        assert_eq!(app_between(&bb, copy, bb.len()), app);
        assert_eq!(bb.iter_app().count(), 2 * n - 1);

        // The terminator appears once, right after TERM.
        let t = term[0];
        let occurrences: Vec<_> = bb
            .iter()
            .enumerate()
            .filter(|(_, i)| i.machine() == Some(&t) && i.is_app())
            .map(|(pos, _)| pos)
            .collect();
        assert_eq!(occurrences, vec![term_pos + 1]);
        assert_eq!(term_pos + 2, bb.len());
    }
}

#[test]
fn test_fall_through_blocks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let markers = markers();
    let app = assemble(|a| {
        a.mov(rcx, 5i64)?;
        a.imul_2(rcx, rdx)?;
        a.not(r9)
    });
    let mut bb = instrumented(&app);
    let before: Vec<_> = bb.iter().map(|i| i.id()).collect();

    let layout = duplicate_block(&markers, &mut bb).unwrap();
    assert!(!layout.relocated_terminator);

    // Original region unmodified: every original instruction survives in order.
    let orig = bb.position(layout.original_start).unwrap();
    let copy = bb.position(layout.copy_start).unwrap();
    let region: Vec<_> = bb.iter().skip(orig + 1).take(copy - orig - 1).map(|i| i.id()).collect();
    assert_eq!(region, before);

    // TERM is strictly after the copy's last instruction and closes the block.
    let term_pos = bb.position(layout.terminator).unwrap();
    assert_eq!(term_pos, bb.len() - 1);
    assert!(bb.iter().nth(term_pos - 1).unwrap().is_app());
    assert_eq!(bb.iter_app().count(), 2 * app.len());
}

#[test]
fn test_copy_has_fresh_identities() {
    let markers = markers();
    let app = assemble(|a| {
        a.add(rax, rbx)?;
        a.ret()
    });
    let mut bb = InstrList::from_app(app.iter().copied());
    duplicate_block(&markers, &mut bb).unwrap();

    let mut ids: Vec<_> = bb.iter().map(|i| i.id()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_layout_of_random_blocks(app in common::block(10)) {
        common::init_logger();
        let markers = markers();
        let n = app.len();
        let ends_in_transfer = app[n - 1].flow_control() != FlowControl::Next;
        let body = if ends_in_transfer { &app[..n - 1] } else { &app[..] };

        let mut bb = instrumented(&app);
        let layout = duplicate_block(&markers, &mut bb).unwrap();
        prop_assert_eq!(layout.relocated_terminator, ends_in_transfer);

        let kinds: Vec<_> = markers.scan(&bb).into_iter().map(|(_, k)| k).collect();
        prop_assert_eq!(
            kinds,
            vec![MarkerKind::OriginalStart, MarkerKind::CopyStart, MarkerKind::Terminator]
        );

        let orig = bb.position(layout.original_start).unwrap();
        let copy = bb.position(layout.copy_start).unwrap();
        let term = bb.position(layout.terminator).unwrap();
        prop_assert!(orig < copy && copy < term);

        prop_assert_eq!(app_between(&bb, orig, copy), body.to_vec());
        prop_assert_eq!(app_between(&bb, copy, term), body.to_vec());
        prop_assert_eq!(app_between(&bb, term, bb.len()), app[body.len()..].to_vec());
        let expected = if ends_in_transfer { 2 * n - 1 } else { 2 * n };
        prop_assert_eq!(bb.iter_app().count(), expected);

        // Instrumentation stays in the original region.
        let is_tool_insn = |i: &&Instr| i.is_meta() && i.machine().is_some();
        prop_assert_eq!(bb.iter().skip(copy).filter(is_tool_insn).count(), 0);
        prop_assert_eq!(bb.iter().filter(is_tool_insn).count(), n);
    }
}
