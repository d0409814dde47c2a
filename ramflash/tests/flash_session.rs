use pretty_assertions::assert_eq;
use ramflash::{
    config::{Registry, Target},
    flashing::{
        FailureReason, FlashAlgorithm, FlashError, FlashProgress, FlashState, Flasher,
        FlasherConfig, Operation, ProgressEvent,
    },
    test::{MockCore, RoutineOutcome},
    Architecture, CoreHandle,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TARGET: &str = include_str!("data/esp32c3.yaml");

const INIT: u64 = 0x4039_0004;
const UNINIT: u64 = 0x4039_0008;
const PROGRAM_PAGE: u64 = 0x4039_000c;
const ERASE_SECTOR: u64 = 0x4039_0010;
const ERASE_ALL: u64 = 0x4039_0014;
const LOAD_ADDRESS: u64 = 0x4039_0000;

fn target() -> Target {
    let mut registry = Registry::new();
    registry
        .add_target_family_from_yaml(TARGET)
        .expect("Failed to parse target description.");
    registry
        .get_target_by_name("esp32c3")
        .expect("Failed to find target.")
}

fn algorithm(target: &Target) -> FlashAlgorithm {
    let raw = target
        .default_flash_algorithm("main")
        .expect("No flash algorithm for the boot memory.");
    FlashAlgorithm::assemble(raw, target).expect("Failed to assemble flash algorithm.")
}

fn core(algorithm: &FlashAlgorithm) -> CoreHandle<MockCore> {
    let mut core = MockCore::new(Architecture::Riscv);
    core.emulate(algorithm);
    CoreHandle::new(core)
}

fn flasher_with_config(config: FlasherConfig) -> Flasher<MockCore> {
    let target = target();
    let algorithm = algorithm(&target);
    Flasher::new(core(&algorithm), algorithm, config)
}

fn flasher() -> Flasher<MockCore> {
    flasher_with_config(FlasherConfig::default())
}

#[test]
fn erase_then_program() {
    let mut flasher = flasher();
    flasher
        .core()
        .lock()
        .unwrap()
        .memory_mut()
        .write(0x1000, &[0u8; 0x1000]);

    flasher.erase_range_session(0x1000, 0x1000).unwrap();
    flasher.program_session(0x1000, &[0x5a; 0x1000]).unwrap();

    assert_eq!(flasher.state(), FlashState::Idle);
    let core = flasher.core().lock().unwrap();
    assert_eq!(core.call_count(INIT), 2);
    assert_eq!(core.call_count(UNINIT), 2);
    assert_eq!(core.call_count(ERASE_SECTOR), 1);
    assert_eq!(core.call_count(PROGRAM_PAGE), 2);
    assert_eq!(core.memory().read_vec(0x1000, 0x1000), vec![0x5a; 0x1000]);
    assert!(core.breakpoints().is_empty());
}

#[test]
fn timeout_fails_session_and_reloads_image() {
    let mut flasher = flasher();
    flasher.core().lock().unwrap().hang_at(ERASE_SECTOR);

    let error = flasher.erase_range_session(0x0, 0x1000).unwrap_err();

    assert!(error.is_timeout());
    assert!(matches!(
        error,
        FlashError::EraseFailed {
            sector_address: 0x0,
            ..
        }
    ));
    assert_eq!(flasher.state(), FlashState::Failed(FailureReason::Timeout));
    assert!(flasher.loaded_image().is_none());
    {
        let core = flasher.core().lock().unwrap();
        assert_eq!(core.call_count(UNINIT), 1);
        assert_eq!(core.image_writes(LOAD_ADDRESS), 1);
    }

    flasher.core().lock().unwrap().emulate(flasher.flash_algorithm());
    flasher.erase_range_session(0x0, 0x1000).unwrap();

    assert_eq!(flasher.state(), FlashState::Idle);
    assert_eq!(flasher.core().lock().unwrap().image_writes(LOAD_ADDRESS), 2);
}

#[test]
fn erase_sector_waits_for_its_configured_timeout() {
    let mut flasher = flasher();
    flasher.core().lock().unwrap().hang_at(ERASE_SECTOR);

    let error = flasher.erase_range_session(0x0, 0x1000).unwrap_err();

    let expected = Duration::from_millis(2000);
    assert!(matches!(
        error.root_cause(),
        FlashError::Timeout {
            routine: "erase_sector",
            timeout,
        } if *timeout == expected
    ));

    let budgets = flasher.core().lock().unwrap().wait_budgets_of(ERASE_SECTOR);
    assert_eq!(budgets.len(), 1);
    assert!(budgets[0] <= expected, "{:?}", budgets[0]);
    assert!(
        budgets[0] > expected - Duration::from_millis(100),
        "{:?}",
        budgets[0]
    );
}

#[test]
fn init_and_uninit_wait_for_their_configured_timeouts() {
    let init_timeout = Duration::from_millis(300);
    let uninit_timeout = Duration::from_millis(400);
    let mut flasher = flasher_with_config(FlasherConfig {
        init_timeout,
        uninit_timeout,
        ..Default::default()
    });

    flasher.erase_range_session(0x0, 0x1000).unwrap();

    let core = flasher.core().lock().unwrap();
    for (address, timeout) in [(INIT, init_timeout), (UNINIT, uninit_timeout)] {
        let budgets = core.wait_budgets_of(address);
        assert_eq!(budgets.len(), 1);
        assert!(budgets[0] <= timeout, "{:?}", budgets[0]);
        assert!(
            budgets[0] > timeout - Duration::from_millis(100),
            "{:?}",
            budgets[0]
        );
    }
}

#[test]
fn last_chunk_is_padded_to_a_full_page() {
    let mut flasher = flasher();
    flasher
        .core()
        .lock()
        .unwrap()
        .memory_mut()
        .write(0x3fff_f800, &[0u8; 0x800]);

    flasher.program_session(0x3fff_f800, &[0x42; 0x600]).unwrap();

    let core = flasher.core().lock().unwrap();
    let calls = core.arguments_of(PROGRAM_PAGE);
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0][..3], &[0x3fff_f800, 0x800, 0x4039_8010]);

    let flash = core.memory().read_vec(0x3fff_f800, 0x800);
    assert_eq!(&flash[..0x600], &[0x42; 0x600][..]);
    assert_eq!(&flash[0x600..], &[0xff; 0x200][..]);
}

#[test]
fn out_of_range_is_rejected_before_any_request() {
    let mut flasher = flasher();

    let error = flasher.program_session(0x500_0000, &[0x1; 4]).unwrap_err();

    assert!(matches!(
        error,
        FlashError::OutOfRange {
            address: 0x500_0000,
            ..
        }
    ));
    assert_eq!(flasher.state(), FlashState::Idle);
    assert_eq!(flasher.core().lock().unwrap().requests(), 0);
}

#[test]
fn failing_sector_aborts_erase() {
    let mut flasher = flasher();
    flasher
        .core()
        .lock()
        .unwrap()
        .set_routine(ERASE_SECTOR, |memory, args| {
            if args[0] == 0x2000 {
                RoutineOutcome::Return(0x11)
            } else {
                memory.erase(args[0]..args[0] + 0x1000);
                RoutineOutcome::Return(0)
            }
        });

    let error = flasher.erase_range_session(0x0, 0x4000).unwrap_err();

    assert!(matches!(
        error,
        FlashError::EraseFailed {
            sector_address: 0x2000,
            ..
        }
    ));
    assert_eq!(error.error_code(), Some(0x11));
    assert_eq!(
        flasher.state(),
        FlashState::Failed(FailureReason::AlgorithmFailure)
    );

    let core = flasher.core().lock().unwrap();
    assert_eq!(core.call_count(ERASE_SECTOR), 3);
    assert_eq!(core.call_count(UNINIT), 1);
}

#[test]
fn failing_uninit_does_not_fail_the_session() {
    let mut flasher = flasher();
    flasher
        .core()
        .lock()
        .unwrap()
        .set_routine(UNINIT, |_, _| RoutineOutcome::Return(1));

    flasher.program_session(0x0, &[0x1, 0x2, 0x3]).unwrap();

    assert_eq!(flasher.state(), FlashState::Idle);
    let core = flasher.core().lock().unwrap();
    assert_eq!(core.memory().read_vec(0x0, 3), vec![0x1, 0x2, 0x3]);
    assert!(core.breakpoints().is_empty());
}

#[test]
fn verify_detects_mismatch() {
    let mut flasher = flasher_with_config(FlasherConfig {
        verify: true,
        ..Default::default()
    });
    flasher
        .core()
        .lock()
        .unwrap()
        .set_routine(PROGRAM_PAGE, |memory, args| {
            let mut page = memory.read_vec(args[2], args[1] as usize);
            page[4] = 0x0;
            memory.write(args[0], &page);
            RoutineOutcome::Return(0)
        });

    let error = flasher.program_session(0x0, &[0x77; 0x10]).unwrap_err();

    assert!(matches!(error, FlashError::VerifyFailed { address: 0x4 }));
    assert_eq!(
        flasher.state(),
        FlashState::Failed(FailureReason::VerifyFailed)
    );
    assert_eq!(flasher.core().lock().unwrap().call_count(UNINIT), 1);
}

#[test]
fn erase_all_session() {
    let mut flasher = flasher();
    flasher
        .core()
        .lock()
        .unwrap()
        .memory_mut()
        .write(0x20_0000, &[0x0; 0x10]);

    flasher.erase_all_session().unwrap();

    let core = flasher.core().lock().unwrap();
    assert_eq!(core.call_count(ERASE_ALL), 1);
    assert_eq!(core.memory().read_vec(0x20_0000, 0x10), vec![0xff; 0x10]);
}

#[test]
fn disconnected_transport_fails_the_session() {
    let mut flasher = flasher();
    flasher.core().lock().unwrap().disconnect();

    let error = flasher.erase_all_session().unwrap_err();

    assert!(matches!(error, FlashError::Transport(_)));
    assert_eq!(flasher.state(), FlashState::Failed(FailureReason::Transport));
}

#[test]
fn progress_is_reported() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = events.clone();
    let progress = FlashProgress::new(move |event| recorder.lock().unwrap().push(event));

    let mut flasher = flasher_with_config(FlasherConfig {
        verify: true,
        ..Default::default()
    })
    .with_progress(progress);

    flasher.program_session(0x0, &[0x33; 0x1000]).unwrap();

    let events = events.lock().unwrap();
    let names: Vec<&str> = events
        .iter()
        .map(|event| match event {
            ProgressEvent::AlgorithmLoaded { .. } => "loaded",
            ProgressEvent::StartedProgramming => "started",
            ProgressEvent::PageProgrammed { .. } => "page",
            ProgressEvent::FinishedProgramming => "finished",
            ProgressEvent::Verified { .. } => "verified",
            _ => "other",
        })
        .collect();
    assert_eq!(
        names,
        vec!["loaded", "started", "page", "page", "finished", "verified"]
    );
}

#[test]
fn flashers_share_a_core() {
    let target = target();
    let algorithm = algorithm(&target);
    let core = core(&algorithm);

    let mut eraser = target
        .flasher(core.clone(), "main", FlasherConfig::default())
        .unwrap();
    let mut programmer = target
        .flasher(core.clone(), "main", FlasherConfig::default())
        .unwrap();

    eraser.erase_range_session(0x0, 0x1000).unwrap();
    programmer.program_session(0x0, &[0x10; 0x20]).unwrap();

    let core = core.lock().unwrap();
    assert_eq!(core.image_writes(LOAD_ADDRESS), 2);
    assert_eq!(core.memory().read_vec(0x0, 0x20), vec![0x10; 0x20]);
}

fn other_algorithm(algorithm: &FlashAlgorithm) -> FlashAlgorithm {
    FlashAlgorithm {
        name: "other-flashloader".to_string(),
        instructions: vec![0xbb; algorithm.instructions.len()],
        ..algorithm.clone()
    }
}

#[test]
fn flasher_reloads_image_overwritten_by_another_flasher() {
    let target = target();
    let first = algorithm(&target);
    let second = other_algorithm(&first);
    let core = core(&first);

    let images = Arc::new(Mutex::new(Vec::new()));
    let recorder = images.clone();
    core.lock()
        .unwrap()
        .set_routine(INIT, move |memory, _| {
            recorder
                .lock()
                .unwrap()
                .push(memory.read_vec(LOAD_ADDRESS, 4));
            RoutineOutcome::Return(0)
        });

    let mut a = Flasher::new(core.clone(), first.clone(), FlasherConfig::default());
    let mut b = Flasher::new(core.clone(), second, FlasherConfig::default());

    a.erase_range_session(0x0, 0x1000).unwrap();
    b.erase_range_session(0x1000, 0x1000).unwrap();
    a.erase_range_session(0x2000, 0x1000).unwrap();

    assert_eq!(core.lock().unwrap().image_writes(LOAD_ADDRESS), 3);
    let own_image = first.instructions[..4].to_vec();
    assert_eq!(
        *images.lock().unwrap(),
        vec![own_image.clone(), vec![0xbb; 4], own_image]
    );
}

#[test]
fn image_overwritten_during_a_session_fails_it() {
    let target = target();
    let first = algorithm(&target);
    let second = other_algorithm(&first);
    let core = core(&first);

    let mut a = Flasher::new(core.clone(), first, FlasherConfig::default());
    let mut b = Flasher::new(core.clone(), second, FlasherConfig::default());

    a.init(Operation::Erase, None).unwrap();
    b.load().unwrap();

    let error = a.erase_sector(0x0).unwrap_err();

    assert!(matches!(error.root_cause(), FlashError::AlgorithmNotLoaded));
    assert_eq!(a.state(), FlashState::Failed(FailureReason::ImageLost));
    assert_eq!(core.lock().unwrap().call_count(ERASE_SECTOR), 0);

    a.uninit();
    assert_eq!(core.lock().unwrap().call_count(UNINIT), 0);
    a.erase_range_session(0x0, 0x1000).unwrap();

    let core = core.lock().unwrap();
    assert_eq!(core.call_count(ERASE_SECTOR), 1);
    assert_eq!(core.image_writes(LOAD_ADDRESS), 3);
}
