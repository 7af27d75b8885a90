
// Instrument drivers built on a Session. Only Tektronix TDS-style scopes for now; further
// manufacturers would get a module each.

pub mod tds;
