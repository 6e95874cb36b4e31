use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{Auth, REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SYSTEM_ERR, SUCCESS};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<Auth> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let body:Vec<u8>  = unpacker.unpack_variable_len_opaque()?;
	Ok(Auth{ flavor, body })
}

// Leaves the unpacker positioned at the procedure's result on success
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<(u32, Auth)> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(err("Expected REPLY message type in RPC header")); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					Err(Error::new(ErrorKind::Other, format!("RPC version mismatch, server supports {}..={}", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					Err(Error::new(ErrorKind::PermissionDenied, format!("RPC call denied with auth status {}", stat)))
				},
				_ => Err(err("RPC call denied for an unknown reason")),
			};
		},
		MSG_ACCEPTED => { },
		_ => return Err(err("Neither MSG_DENIED nor MSG_ACCEPTED in RPC reply")),
	}

	let verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok((xid, verf)),
		PROG_UNAVAIL  => Err(err("RPC program unavailable")),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(Error::new(ErrorKind::Other, format!("RPC program version mismatch, server supports {}..={}", low, high)))
		},
		PROC_UNAVAIL  => Err(err("RPC procedure unavailable")),
		GARBAGE_ARGS  => Err(err("RPC server could not decode arguments")),
		SYSTEM_ERR    => Err(err("RPC server system error")),
		_             => Err(err("RPC call failed for an unknown reason")),
	}
}
