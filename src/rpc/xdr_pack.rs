use std::io;

use crate::xdr::Packer;
use crate::rpc::{Auth, CALL, RPCVERSION};

pub fn pack_auth(packer:&mut Packer, auth:&Auth) -> io::Result<()> {
	packer.pack_enum(auth.flavor)?;
	packer.pack_variable_len_opaque(&auth.body)
}

pub fn pack_callheader(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32, cred:&Auth, verf:&Auth) -> io::Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prc)?;
	pack_auth(packer, cred)?;
	pack_auth(packer, verf)
}

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> io::Result<()> {
	pack_callheader(packer, xid, prog, vers, prc, &Auth::none(), &Auth::none())
}

pub fn pack_mapping(packer:&mut Packer, prog:u32, vers:u32, prot:u32, port:u32) -> io::Result<()> {
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prot)?;
	packer.pack_u32(port)
}
