//! Drives the C ABI directly against a CSV file on disk.

use fusion_native::*;
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Word(u64),
    Failed(ErrorCode, String),
}

static OUTCOMES: Mutex<Option<HashMap<u64, Outcome>>> = Mutex::new(None);

fn store(token: u64, outcome: Outcome) {
    let mut lock = OUTCOMES.lock().unwrap();
    lock.get_or_insert_with(HashMap::new).insert(token, outcome);
}

/// Copies the first eight bytes of the result: a count, a handle, or nothing.
unsafe extern "C" fn on_word(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    if !error.is_null() {
        let error = &*error;
        let message = error.message.as_opt_slice().map(|s| String::from_utf8_lossy(s).to_string());
        store(token, Outcome::Failed(ErrorCode::from_raw(error.code), message.unwrap_or_default()));
    } else {
        store(token, Outcome::Word(*(result as *const u64)));
    }
}

unsafe extern "C" fn on_void(_result: *const c_void, error: *const ErrorInfoData, token: u64) {
    if error.is_null() {
        store(token, Outcome::Word(0));
    } else {
        on_word(std::ptr::null(), error, token);
    }
}

fn wait(token: u64) -> Outcome {
    for _ in 0..1000 {
        if let Some(outcome) = OUTCOMES.lock().unwrap().as_ref().and_then(|m| m.get(&token).cloned()) {
            return outcome;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("token {token} never completed");
}

#[test]
fn csv_query_counts_rows() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "id,name\n1,a\n2,b\n3,c").unwrap();
    file.flush().unwrap();

    let mut runtime = std::ptr::null_mut();
    let mut context = std::ptr::null_mut();
    unsafe {
        assert_eq!(fusion_runtime_new(2, 0, &mut runtime), ErrorCode::Ok);
        assert_eq!(fusion_context_new(runtime, &mut context), ErrorCode::Ok);
    }

    let table = CString::new("people").unwrap();
    let path = CString::new(file.path().to_str().unwrap()).unwrap();
    let status =
        unsafe { fusion_context_register_csv(context, table.as_ptr(), path.as_ptr(), BytesData::empty(), on_void, 1) };
    assert_eq!(status, ErrorCode::Ok);
    assert_eq!(wait(1), Outcome::Word(0));

    let sql = CString::new("SELECT * FROM people WHERE id > 1").unwrap();
    assert_eq!(unsafe { fusion_context_sql(context, sql.as_ptr(), on_word, 2) }, ErrorCode::Ok);
    let Outcome::Word(raw) = wait(2) else {
        panic!("sql failed");
    };
    let dataframe = raw as usize as *mut DataFrameWrapper;

    assert_eq!(unsafe { fusion_dataframe_count(dataframe, on_word, 3) }, ErrorCode::Ok);
    assert_eq!(wait(3), Outcome::Word(2));

    unsafe {
        assert_eq!(fusion_dataframe_destroy(dataframe), ErrorCode::Ok);
        assert_eq!(fusion_context_destroy(context), ErrorCode::Ok);
        assert_eq!(fusion_runtime_destroy(runtime), ErrorCode::Ok);
    }
}

#[test]
fn unknown_table_is_an_engine_error() {
    let mut runtime = std::ptr::null_mut();
    let mut context = std::ptr::null_mut();
    unsafe {
        assert_eq!(fusion_runtime_new(1, 0, &mut runtime), ErrorCode::Ok);
        assert_eq!(fusion_context_new(runtime, &mut context), ErrorCode::Ok);
    }

    let sql = CString::new("SELECT * FROM missing").unwrap();
    assert_eq!(unsafe { fusion_context_sql(context, sql.as_ptr(), on_word, 100) }, ErrorCode::Ok);
    match wait(100) {
        Outcome::Failed(code, message) => {
            assert_eq!(code, ErrorCode::DataFusionError);
            assert!(message.contains("missing"), "{message}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    unsafe {
        assert_eq!(fusion_context_destroy(context), ErrorCode::Ok);
        assert_eq!(fusion_runtime_destroy(runtime), ErrorCode::Ok);
    }
}
