// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! COM automation backend.
//!
//! COM interface pointers are apartment-bound, so every call runs on one dedicated worker
//! thread that initializes COM once and owns the attached `IDispatch` objects. Callers hand it
//! closures over a channel and block on the reply.

use std::sync::mpsc;

use windows::core::{Interface, BSTR, GUID, HSTRING, IUnknown, PCWSTR, VARIANT};
use windows::Win32::Foundation::{
    HWND, RPC_E_CALL_REJECTED, RPC_E_SERVERCALL_RETRYLATER, WIN32_ERROR,
};
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoInitializeEx, CoUninitialize, IDispatch, COINIT_APARTMENTTHREADED,
    DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::{GetActiveObject, DISPID_PROPERTYPUT};
use windows::Win32::System::Registry::{RegGetValueW, HKEY_CLASSES_ROOT, RRF_RT_REG_SZ};
use windows::Win32::System::Variant::{VT_BSTR, VT_EMPTY, VT_R4, VT_R8};
use windows::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;

use super::{Automation, Connector, EndpointError, Variable, GENERIC_IDENTITY};

const LOCALE_USER_DEFAULT: u32 = 0x0400;

struct CoInitializer;

impl CoInitializer {
    fn new() -> Self {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        if hr.is_err() {
            tracing::error!(?hr, "CoInitializeEx failed");
        }
        Self
    }
}

impl Drop for CoInitializer {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

fn map_error(err: windows::core::Error) -> EndpointError {
    let code = err.code();
    if code == RPC_E_CALL_REJECTED || code == RPC_E_SERVERCALL_RETRYLATER {
        EndpointError::Busy
    } else {
        EndpointError::Call(err.message())
    }
}

/// Objects owned by the worker thread.
#[derive(Default)]
struct Attached {
    application: Option<IDispatch>,
}

impl Attached {
    fn application(&self) -> Result<&IDispatch, EndpointError> {
        self.application.as_ref().ok_or_else(|| EndpointError::Call("not attached".to_owned()))
    }

    fn document(&self) -> Result<IDispatch, EndpointError> {
        let doc = get_property(self.application()?, "ActiveDocument")?;
        dispatch_of(&doc)
    }
}

type Job = Box<dyn FnOnce(&mut Attached) + Send>;

#[derive(Clone)]
struct Worker {
    jobs: mpsc::Sender<Job>,
}

impl Worker {
    fn spawn() -> Self {
        let (jobs, rx) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("acad-com".to_owned())
            .spawn(move || {
                let _com = CoInitializer::new();
                let mut attached = Attached::default();
                while let Ok(job) = rx.recv() {
                    job(&mut attached);
                }
            })
            .expect("spawn COM worker thread");
        Self { jobs }
    }

    fn exec<T, F>(&self, op: F) -> Result<T, EndpointError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Attached) -> Result<T, EndpointError> + Send + 'static,
    {
        let (reply, result) = mpsc::channel();
        let job: Job = Box::new(move |attached| {
            let _ = reply.send(op(attached));
        });
        self.jobs
            .send(job)
            .map_err(|_| EndpointError::Call("COM worker thread stopped".to_owned()))?;
        result
            .recv()
            .map_err(|_| EndpointError::Call("COM worker thread stopped".to_owned()))?
    }
}

fn dispid(target: &IDispatch, name: &str) -> Result<i32, EndpointError> {
    let wide = HSTRING::from(name);
    let names = [PCWSTR(wide.as_ptr())];
    let mut id = 0i32;
    unsafe {
        target.GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE_USER_DEFAULT, &mut id)
    }
    .map_err(map_error)?;
    Ok(id)
}

fn invoke(
    target: &IDispatch,
    name: &str,
    flags: DISPATCH_FLAGS,
    mut args: Vec<VARIANT>,
) -> Result<VARIANT, EndpointError> {
    let id = dispid(target, name)?;
    // IDispatch takes arguments right to left.
    args.reverse();
    let mut named = DISPID_PROPERTYPUT;
    let params = DISPPARAMS {
        rgvarg: if args.is_empty() { std::ptr::null_mut() } else { args.as_mut_ptr() },
        rgdispidNamedArgs: if flags == DISPATCH_PROPERTYPUT {
            &mut named
        } else {
            std::ptr::null_mut()
        },
        cArgs: args.len() as u32,
        cNamedArgs: u32::from(flags == DISPATCH_PROPERTYPUT),
    };
    let mut result = VARIANT::default();
    unsafe {
        target.Invoke(
            id,
            &GUID::zeroed(),
            LOCALE_USER_DEFAULT,
            flags,
            &params,
            Some(&mut result),
            None,
            None,
        )
    }
    .map_err(map_error)?;
    Ok(result)
}

fn get_property(target: &IDispatch, name: &str) -> Result<VARIANT, EndpointError> {
    invoke(target, name, DISPATCH_PROPERTYGET, Vec::new())
}

fn put_property(target: &IDispatch, name: &str, value: VARIANT) -> Result<(), EndpointError> {
    invoke(target, name, DISPATCH_PROPERTYPUT, vec![value]).map(|_| ())
}

fn call_method(target: &IDispatch, name: &str, args: Vec<VARIANT>) -> Result<VARIANT, EndpointError> {
    invoke(target, name, DISPATCH_METHOD, args)
}

fn dispatch_of(value: &VARIANT) -> Result<IDispatch, EndpointError> {
    IUnknown::try_from(value).and_then(|unknown| unknown.cast::<IDispatch>()).map_err(map_error)
}

fn text_of(value: &VARIANT) -> Result<String, EndpointError> {
    BSTR::try_from(value).map(|text| text.to_string()).map_err(map_error)
}

fn variable_of(value: &VARIANT) -> Variable {
    let vt = value.vt();
    if vt == VT_EMPTY {
        Variable::Empty
    } else if vt == VT_BSTR {
        BSTR::try_from(value).map(|text| Variable::Text(text.to_string())).unwrap_or(Variable::Empty)
    } else if vt == VT_R8 || vt == VT_R4 {
        f64::try_from(value).map(Variable::Real).unwrap_or(Variable::Empty)
    } else {
        i64::try_from(value).map(Variable::Int).unwrap_or(Variable::Empty)
    }
}

fn variant_of(value: Variable) -> VARIANT {
    match value {
        Variable::Empty => VARIANT::default(),
        // System variables are 16-bit or 32-bit integers on the application side.
        Variable::Int(int) => match i16::try_from(int) {
            Ok(short) => VARIANT::from(short),
            Err(_) => VARIANT::from(int as i32),
        },
        Variable::Real(real) => VARIANT::from(real),
        Variable::Text(text) => VARIANT::from(BSTR::from(text)),
    }
}

fn active_object(identity: &str) -> Result<IDispatch, EndpointError> {
    let clsid = unsafe { CLSIDFromProgID(&HSTRING::from(identity)) }
        .map_err(|_| EndpointError::Unavailable(identity.to_owned()))?;
    let mut unknown = None;
    unsafe { GetActiveObject(&clsid, None, &mut unknown) }.map_err(|err| {
        let mapped = map_error(err);
        if mapped.is_busy() {
            mapped
        } else {
            EndpointError::Unavailable(identity.to_owned())
        }
    })?;
    let unknown = unknown.ok_or_else(|| EndpointError::Unavailable(identity.to_owned()))?;
    unknown.cast::<IDispatch>().map_err(map_error)
}

fn registry_cur_ver() -> Option<String> {
    let key = HSTRING::from(format!("{GENERIC_IDENTITY}\\CurVer"));
    let mut buf = [0u16; 256];
    let mut size = (buf.len() * std::mem::size_of::<u16>()) as u32;
    let status = unsafe {
        RegGetValueW(
            HKEY_CLASSES_ROOT,
            &key,
            PCWSTR::null(),
            RRF_RT_REG_SZ,
            None,
            Some(buf.as_mut_ptr().cast()),
            Some(&mut size),
        )
    };
    if status != WIN32_ERROR(0) {
        return None;
    }
    let chars = (size as usize / std::mem::size_of::<u16>()).saturating_sub(1);
    let value = String::from_utf16_lossy(&buf[..chars.min(buf.len())]);
    let value = value.trim_end_matches('\0').trim().to_owned();
    (!value.is_empty()).then_some(value)
}

pub(crate) struct ComConnector {
    worker: Worker,
}

impl ComConnector {
    pub(crate) fn new() -> Self {
        Self { worker: Worker::spawn() }
    }
}

impl Connector for ComConnector {
    fn attach(&mut self, identity: &str) -> Result<Box<dyn Automation>, EndpointError> {
        let owned = identity.to_owned();
        self.worker.exec(move |attached| {
            attached.application = Some(active_object(&owned)?);
            Ok(())
        })?;
        Ok(Box::new(ComEndpoint { worker: self.worker.clone() }))
    }

    fn registry_alias(&mut self) -> Option<String> {
        registry_cur_ver()
    }
}

struct ComEndpoint {
    worker: Worker,
}

impl Automation for ComEndpoint {
    fn set_visible(&mut self, visible: bool) -> Result<(), EndpointError> {
        self.worker
            .exec(move |attached| put_property(attached.application()?, "Visible", VARIANT::from(visible)))
    }

    fn document_name(&mut self) -> Result<String, EndpointError> {
        self.worker.exec(|attached| text_of(&get_property(&attached.document()?, "Name")?))
    }

    fn document_path(&mut self) -> Result<String, EndpointError> {
        self.worker.exec(|attached| text_of(&get_property(&attached.document()?, "Path")?))
    }

    fn get_variable(&mut self, name: &str) -> Result<Variable, EndpointError> {
        let name = name.to_owned();
        self.worker.exec(move |attached| {
            let value = call_method(
                &attached.document()?,
                "GetVariable",
                vec![VARIANT::from(BSTR::from(name))],
            )?;
            Ok(variable_of(&value))
        })
    }

    fn set_variable(&mut self, name: &str, value: Variable) -> Result<(), EndpointError> {
        let name = name.to_owned();
        self.worker.exec(move |attached| {
            call_method(
                &attached.document()?,
                "SetVariable",
                vec![VARIANT::from(BSTR::from(name)), variant_of(value)],
            )
            .map(|_| ())
        })
    }

    fn send_command(&mut self, text: &str) -> Result<(), EndpointError> {
        let text = text.to_owned();
        self.worker.exec(move |attached| {
            call_method(&attached.document()?, "SendCommand", vec![VARIANT::from(BSTR::from(text))])
                .map(|_| ())
        })
    }

    fn is_quiescent(&mut self) -> Result<bool, EndpointError> {
        self.worker.exec(|attached| {
            let state = call_method(attached.application()?, "GetAcadState", Vec::new())?;
            let quiescent = get_property(&dispatch_of(&state)?, "IsQuiescent")?;
            bool::try_from(&quiescent).map_err(map_error)
        })
    }

    fn window_handle(&mut self) -> Result<Option<i64>, EndpointError> {
        self.worker.exec(|attached| {
            let hwnd = get_property(attached.application()?, "HWND")?;
            Ok(i64::try_from(&hwnd).ok().filter(|hwnd| *hwnd != 0))
        })
    }

    fn process_id(&mut self) -> Option<u32> {
        let hwnd = self.window_handle().ok().flatten()?;
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(HWND(hwnd as isize as *mut _), Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }
}
