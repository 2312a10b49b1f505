//! Runtime resolution: caching, concurrency, extern dispatch.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use xenon_cpu::backend::BackendKind;
use xenon_cpu::prelude::*;
use xenon_cpu::runtime::{Module, RuntimeOptions};

const ENTRY: u32 = 0x2000;
const MEM_SIZE: usize = 0x10_0000;

fn make_runtime(program: &[u32]) -> Arc<Runtime> {
    let memory = Arc::new(Memory::new(MEM_SIZE));
    for (n, word) in program.iter().enumerate() {
        memory.store32(ENTRY + n as u32 * 4, *word);
    }
    let runtime = Runtime::new(
        memory,
        RuntimeOptions {
            backend: BackendKind::Interpreter,
            ..Default::default()
        },
    );
    runtime.add_module(Arc::new(Module::new("test", 0, MEM_SIZE as u32)));
    runtime
}

fn mtctr(rs: u32) -> u32 {
    (31 << 26) | (rs << 21) | ((9 & 0x1F) << 16) | (467 << 1)
}

fn bctrl() -> u32 {
    (19 << 26) | (20 << 21) | (528 << 1) | 1
}

fn addi(rt: u32, ra: u32, simm: i16) -> u32 {
    (14 << 26) | (rt << 21) | (ra << 16) | (simm as u16 as u32)
}

fn blr() -> u32 {
    0x4E80_0020
}

#[test]
fn resolution_is_cached() {
    let runtime = make_runtime(&[addi(3, 0, 1), blr()]);
    let first = runtime.resolve_function(ENTRY).expect("resolve");
    let second = runtime.resolve_function(ENTRY).expect("resolve again");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(runtime.find_functions_with_address(ENTRY).len(), 1);
}

#[test]
fn unknown_addresses_fail_without_poisoning_others() {
    let runtime = make_runtime(&[addi(3, 0, 1), blr()]);
    // Far outside every module.
    let bad = runtime.resolve_function(0xFFF0_0000 - 4);
    assert!(bad.is_err());
    assert!(runtime.resolve_function(ENTRY).is_ok());
}

#[test]
fn invalid_code_poisons_the_entry() {
    let runtime = make_runtime(&[0xFFFF_FFFF]);
    assert!(runtime.resolve_function(ENTRY).is_err());
    // Second attempt observes the failed entry instead of retranslating.
    match runtime.resolve_function(ENTRY) {
        Err(ResolveError::Failed(address)) => assert_eq!(address, ENTRY),
        other => panic!("expected a poisoned entry, got {other:?}"),
    }
}

#[test]
fn concurrent_resolution_yields_one_function() {
    let runtime = make_runtime(&[addi(3, 0, 7), blr()]);
    let mut joins = Vec::new();
    for _ in 0..8 {
        let runtime = runtime.clone();
        joins.push(std::thread::spawn(move || {
            runtime.resolve_function(ENTRY).expect("resolve")
        }));
    }
    let functions: Vec<_> = joins.into_iter().map(|j| j.join().unwrap()).collect();
    for f in &functions[1..] {
        assert!(Arc::ptr_eq(&functions[0], f));
    }
    assert_eq!(runtime.find_functions_with_address(ENTRY).len(), 1);
}

static SERVICE_CALLS: AtomicU32 = AtomicU32::new(0);

fn service_handler(thread: &mut ThreadState, arg0: u64, arg1: u64) {
    assert_eq!((arg0, arg1), (7, 9));
    SERVICE_CALLS.fetch_add(1, Ordering::SeqCst);
    // Leave a marker the guest can observe.
    thread.context_mut().set_gpr(11, 0x5A5A);
}

#[test]
fn indirect_calls_reach_extern_functions() {
    // mtctr r12 ; bctrl ; bctrl ; blr
    let runtime = make_runtime(&[mtctr(12), bctrl(), bctrl(), blr()]);
    let info = runtime.define_builtin("TestService", service_handler, 7, 9);
    let target = info.address();

    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_gpr(12, target as u64);
    let function = runtime.resolve_function(ENTRY).expect("resolve");
    function.call(&mut thread).expect("execute");

    assert_eq!(SERVICE_CALLS.load(Ordering::SeqCst), 2);
    assert_eq!(thread.context().gpr(11), 0x5A5A);
    // The extern body was generated once and cached.
    assert_eq!(runtime.find_functions_with_address(target).len(), 1);
}

#[test]
fn guest_to_guest_calls_link_through_the_runtime() {
    // Callee at ENTRY+0x100: addi r3, r3, 5 ; blr
    // Caller at ENTRY: bl callee ; addi r3, r3, 1 ; blr
    let callee_off = 0x100u32;
    let bl = (18 << 26) | (callee_off & 0x03FF_FFFC) | 1;
    let runtime = make_runtime(&[bl, addi(3, 3, 1), blr()]);
    runtime.memory().store32(ENTRY + callee_off, addi(3, 3, 5));
    runtime.memory().store32(ENTRY + callee_off + 4, blr());

    let mut thread = ThreadState::new(runtime.clone(), 1);
    thread.context_mut().set_gpr(3, 100);
    let function = runtime.resolve_function(ENTRY).expect("resolve");
    function.call(&mut thread).expect("execute");
    assert_eq!(thread.context().gpr(3), 106);
    // LR was updated for the call.
    assert_eq!(thread.context().lr(), (ENTRY + 4) as u64);
}
