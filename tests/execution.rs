//! End-to-end translation scenarios through the interpreter backend.

use std::sync::Arc;

use xenon_cpu::backend::BackendKind;
use xenon_cpu::prelude::*;
use xenon_cpu::runtime::Module;

const ENTRY: u32 = 0x1000;
const MEM_SIZE: usize = 0x40_0000;

fn make_runtime(kind: BackendKind, program: &[u32]) -> Arc<Runtime> {
    let memory = Arc::new(Memory::new(MEM_SIZE));
    for (n, word) in program.iter().enumerate() {
        memory.store32(ENTRY + n as u32 * 4, *word);
    }
    let runtime = Runtime::new(
        memory,
        xenon_cpu::runtime::RuntimeOptions {
            backend: kind,
            ..Default::default()
        },
    );
    runtime.add_module(Arc::new(Module::new("test", 0, MEM_SIZE as u32)));
    runtime
}

fn run(runtime: &Arc<Runtime>, thread: &mut ThreadState) {
    let function = runtime.resolve_function(ENTRY).expect("resolve");
    function.call(thread).expect("execute");
}

// Encoding helpers for the handful of instructions the scenarios need.

fn addi(rt: u32, ra: u32, simm: i16) -> u32 {
    (14 << 26) | (rt << 21) | (ra << 16) | (simm as u16 as u32)
}

fn addic_rc(rt: u32, ra: u32, simm: i16) -> u32 {
    (13 << 26) | (rt << 21) | (ra << 16) | (simm as u16 as u32)
}

fn addc(rt: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (rt << 21) | (ra << 16) | (rb << 11) | (10 << 1)
}

fn adde(rt: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (rt << 21) | (ra << 16) | (rb << 11) | (138 << 1)
}

fn bc(bo: u32, bi: u32, bd: i16) -> u32 {
    (16 << 26) | (bo << 21) | (bi << 16) | (bd as u16 as u32 & 0xFFFC)
}

fn blr() -> u32 {
    0x4E80_0020
}

fn lvx(vt: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (vt << 21) | (ra << 16) | (rb << 11) | (103 << 1)
}

fn stvx(vt: u32, ra: u32, rb: u32) -> u32 {
    (31 << 26) | (vt << 21) | (ra << 16) | (rb << 11) | (231 << 1)
}

fn vxor(vd: u32, va: u32, vb: u32) -> u32 {
    (4 << 26) | (vd << 21) | (va << 16) | (vb << 11) | 0x4C4
}

fn vaddfp128(vd: u32, va: u32, vb: u32) -> u32 {
    let base = (5 << 26) | (16 & 0x3D0);
    base | ((vd & 0x1F) << 21)
        | ((va & 0x1F) << 16)
        | ((vb & 0x1F) << 11)
        | ((vd >> 5) & 0x3) << 2
        | ((va >> 5) & 0x1) << 5
        | ((va >> 6) & 0x1) << 10
        | (vb >> 5) & 0x3
}

#[test]
fn vaddfp128_adds_lanes() {
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[vaddfp128(3, 1, 2), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread
        .context_mut()
        .set_vr(1, Vec128::from_f32x4([1.0, 2.0, 3.0, 4.0]));
    thread
        .context_mut()
        .set_vr(2, Vec128::from_f32x4([10.0, 20.0, 30.0, 40.0]));
    run(&runtime, &mut thread);
    assert_eq!(
        thread.context().vr(3).to_f32x4(),
        [11.0, 22.0, 33.0, 44.0]
    );
}

#[test]
fn vxor_self_is_a_zero_splat() {
    let runtime = make_runtime(BackendKind::Interpreter, &[vxor(5, 5, 5), blr()]);
    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_vr(
        5,
        Vec128::from_u32x4([0xDEAD_BEEF, 0x1234_5678, 0, 0xFFFF_FFFF]),
    );
    run(&runtime, &mut thread);
    assert_eq!(thread.context().vr(5), Vec128::ZERO);

    // The translator must short-circuit to a constant: no XOR in the HIR.
    let module = runtime.module("test").unwrap();
    let (info, _) = module.declare_function(ENTRY);
    let frontend = xenon_cpu::frontend::PpcFrontend::new();
    frontend
        .declare_function(runtime.memory(), &info)
        .expect("declare");
    let hir = frontend
        .define_function(&runtime, &info, 0)
        .expect("define");
    assert!(!hir.instrs().iter().any(|i| i.opcode == Opcode::Xor));
}

#[test]
fn lvx_stvx_round_trips_memory() {
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[lvx(4, 0, 3), stvx(4, 0, 4), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    for n in 0..16u32 {
        runtime.memory().store8(0x10000 + n, n as u8);
    }
    thread.context_mut().set_gpr(3, 0x10000);
    thread.context_mut().set_gpr(4, 0x20000);
    run(&runtime, &mut thread);
    for n in 0..16u32 {
        assert_eq!(runtime.memory().load8(0x20000 + n), n as u8);
    }
}

#[test]
fn v128_memory_access_masks_low_address_bits() {
    // An unaligned base still reads the 16-byte-aligned block.
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[lvx(4, 0, 3), stvx(4, 0, 4), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    for n in 0..16u32 {
        runtime.memory().store8(0x10000 + n, 0x40 + n as u8);
    }
    thread.context_mut().set_gpr(3, 0x1000B);
    thread.context_mut().set_gpr(4, 0x20007);
    run(&runtime, &mut thread);
    for n in 0..16u32 {
        assert_eq!(runtime.memory().load8(0x20000 + n), 0x40 + n as u8);
    }
}

#[test]
fn addc_records_the_carry() {
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[addc(6, 4, 5), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_gpr(4, u64::MAX);
    thread.context_mut().set_gpr(5, 1);
    run(&runtime, &mut thread);
    assert_eq!(thread.context().gpr(6), 0);
    assert!(thread.context().xer_ca());
}

#[test]
fn adde_consumes_the_carry() {
    // r6 = r4 + r5 (carries), then r7 = r0-ish zero + zero + CA.
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[addc(6, 4, 5), adde(7, 8, 9), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_gpr(4, u64::MAX);
    thread.context_mut().set_gpr(5, 1);
    thread.context_mut().set_gpr(8, 10);
    thread.context_mut().set_gpr(9, 20);
    run(&runtime, &mut thread);
    assert_eq!(thread.context().gpr(7), 31);
}

#[test]
fn conditional_back_branch_loops() {
    // Count r3 down to zero: addic. r3, r3, -1 ; bne -4.
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[
            addic_rc(3, 3, -1),
            bc(4, 2, -4), // branch while CR0.EQ is clear
            blr(),
        ],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_gpr(3, 5);
    run(&runtime, &mut thread);
    assert_eq!(thread.context().gpr(3), 0);
}

#[test]
fn addi_materializes_immediates() {
    let runtime = make_runtime(
        BackendKind::Interpreter,
        &[addi(3, 0, 42), addi(4, 3, -2), blr()],
    );
    let mut thread = ThreadState::new(runtime.clone(), 1);
    run(&runtime, &mut thread);
    assert_eq!(thread.context().gpr(3), 42);
    assert_eq!(thread.context().gpr(4), 40);
}

#[test]
fn random_words_never_panic_the_decoder() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
    for _ in 0..100_000 {
        let word: u32 = rng.gen();
        let _ = PpcOp::decode(word);
    }
}
