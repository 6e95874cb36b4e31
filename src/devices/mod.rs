// Siglent SDS oscilloscopes. Other families would sit beside this one as sibling modules.
pub mod sds;
