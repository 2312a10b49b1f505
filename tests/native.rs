//! Native backend smoke tests, and parity against the interpreter.

#![cfg(all(target_arch = "x86_64", unix))]

use std::sync::Arc;

use xenon_cpu::backend::BackendKind;
use xenon_cpu::prelude::*;
use xenon_cpu::runtime::{Module, RuntimeOptions};

const ENTRY: u32 = 0x4000;
const MEM_SIZE: usize = 0x10_0000;

fn make_runtime(kind: BackendKind, program: &[u32]) -> Arc<Runtime> {
    let memory = Arc::new(Memory::new(MEM_SIZE));
    for (n, word) in program.iter().enumerate() {
        memory.store32(ENTRY + n as u32 * 4, *word);
    }
    let runtime = Runtime::new(
        memory,
        RuntimeOptions {
            backend: kind,
            ..Default::default()
        },
    );
    runtime.add_module(Arc::new(Module::new("test", 0, MEM_SIZE as u32)));
    runtime
}

fn addi(rt: u32, ra: u32, simm: i16) -> u32 {
    (14 << 26) | (rt << 21) | (ra << 16) | (simm as u16 as u32)
}

fn addic_rc(rt: u32, ra: u32, simm: i16) -> u32 {
    (13 << 26) | (rt << 21) | (ra << 16) | (simm as u16 as u32)
}

fn addc(rt: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (rt << 21) | (ra << 16) | (rb << 11) | (10 << 1)
}

fn stw(rs: u32, ra: u32, d: i16) -> u32 {
    (36 << 26) | (rs << 21) | (ra << 16) | (d as u16 as u32)
}

fn lwz(rt: u32, ra: u32, d: i16) -> u32 {
    (32 << 26) | (rt << 21) | (ra << 16) | (d as u16 as u32)
}

fn bc(bo: u32, bi: u32, bd: i16) -> u32 {
    (16 << 26) | (bo << 21) | (bi << 16) | (bd as u16 as u32 & 0xFFFC)
}

fn blr() -> u32 {
    0x4E80_0020
}

fn run(kind: BackendKind, program: &[u32], setup: impl Fn(&mut ThreadState)) -> (Arc<Runtime>, ThreadState) {
    let runtime = make_runtime(kind, program);
    let mut thread = ThreadState::new(runtime.clone(), 1);
    setup(&mut thread);
    let function = runtime.resolve_function(ENTRY).expect("resolve");
    function.call(&mut thread).expect("execute");
    (runtime, thread)
}

#[test]
fn native_immediates_and_registers() {
    let (_rt, thread) = run(
        BackendKind::X64,
        &[addi(3, 0, 42), addi(4, 3, -2), addc(5, 3, 4), blr()],
        |_| {},
    );
    assert_eq!(thread.context().gpr(3), 42);
    assert_eq!(thread.context().gpr(4), 40);
    assert_eq!(thread.context().gpr(5), 82);
}

#[test]
fn native_memory_round_trip() {
    // stw r3, 0x100(r4) ; lwz r5, 0x100(r4)
    let (runtime, thread) = run(
        BackendKind::X64,
        &[stw(3, 4, 0x100), lwz(5, 4, 0x100), blr()],
        |t| {
            t.context_mut().set_gpr(3, 0x1122_3344);
            t.context_mut().set_gpr(4, 0x8000);
        },
    );
    assert_eq!(thread.context().gpr(5), 0x1122_3344);
    // Big-endian layout in guest memory.
    assert_eq!(runtime.memory().load8(0x8100), 0x11);
    assert_eq!(runtime.memory().load8(0x8103), 0x44);
}

#[test]
fn native_carry_matches_the_interpreter() {
    let program = [addc(6, 4, 5), blr()];
    for kind in [BackendKind::Interpreter, BackendKind::X64] {
        let (_rt, thread) = run(kind, &program, |t| {
            t.context_mut().set_gpr(4, u64::MAX);
            t.context_mut().set_gpr(5, 1);
        });
        assert_eq!(thread.context().gpr(6), 0, "{kind:?}");
        assert!(thread.context().xer_ca(), "{kind:?}");
    }
}

#[test]
fn native_loop_parity() {
    let program = [addic_rc(3, 3, -1), bc(4, 2, -4), blr()];
    let mut results = Vec::new();
    for kind in [BackendKind::Interpreter, BackendKind::X64] {
        let (_rt, thread) = run(kind, &program, |t| {
            t.context_mut().set_gpr(3, 17);
        });
        results.push((thread.context().gpr(3), thread.context().cr_value()));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].0, 0);
}

#[test]
fn native_vector_round_trip() {
    // lvx v4, 0, r3 ; stvx v4, 0, r4
    let lvx = (31 << 26) | (4 << 21) | (3 << 11) | (103 << 1) | (0 << 16);
    let stvx = (31 << 26) | (4 << 21) | (4 << 11) | (231 << 1) | (0 << 16);
    let (runtime, _thread) = run(BackendKind::X64, &[lvx, stvx, blr()], |t| {
        t.context_mut().set_gpr(3, 0x9000);
        t.context_mut().set_gpr(4, 0xA000);
        let memory = t.memory().clone();
        for n in 0..16u32 {
            memory.store8(0x9000 + n, n as u8);
        }
    });
    for n in 0..16u32 {
        assert_eq!(runtime.memory().load8(0xA000 + n), n as u8);
    }
}
