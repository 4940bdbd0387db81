use crate::global::commands::command_def;
use crate::global::terminals::terminal_def;
use crate::global::token_codes::{TermCode, TokenType};
use crate::utils::buffers::{read_u16, read_u32, write_u16};
use crate::values::counters::HeapCounters;
use crate::values::value::{Value, ValueKind};

/// Program token storage size, in bytes.
pub const PROG_MEM_SIZE: usize = 2000;
/// Immediate-mode command line token storage size, in bytes.
pub const IMM_MEM_SIZE: usize = 300;

/// Token step where the immediate-mode area starts. Steps below this are
/// inside the program (user function bodies); steps at or above belong to the
/// command line currently executing (the main level).
pub const IMM_START: u16 = PROG_MEM_SIZE as u16;

/// String-constant payload for the empty string (no pool entry is created).
pub const EMPTY_STRING: u32 = u32::MAX;

/// Record sizes that are not stored in the header byte.
const TERMINAL_TOKEN_LEN: usize = 1;
const CONSTANT_TOKEN_LEN: usize = 5;

/// Safety bound when following a block token chain.
const MAX_BLOCK_CHAIN: usize = 256;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Area {
    Program,
    Immediate,
}

/// The fixed-size token buffer: a linear sequence of variable-length token
/// records, each starting with a header byte carrying the token kind in the
/// low nibble and a length, value kind or terminal sub-index in the high
/// nibble. A zero byte terminates each area.
///
/// String constants live in a side pool; the constant token payload is the
/// pool index (heap accounting stays per parsed string).
#[derive(Debug)]
pub struct ProgramStorage {
    bytes: Vec<u8>,
    program_len: usize,
    imm_len: usize,
    strings: Vec<Option<String>>,
}

impl Default for ProgramStorage {
    fn default() -> Self {
        ProgramStorage {
            bytes: vec![0; PROG_MEM_SIZE + IMM_MEM_SIZE],
            program_len: 0,
            imm_len: 0,
            strings: Vec::new(),
        }
    }
}

impl ProgramStorage {
    pub fn program_len(&self) -> usize {
        self.program_len
    }

    /// Step of the first token to execute for the given area.
    pub fn area_start(&self, area: Area) -> u16 {
        match area {
            Area::Program => 0,
            Area::Immediate => IMM_START,
        }
    }

    fn area_bounds(&self, area: Area) -> (usize, usize, usize) {
        // (start, used, capacity)
        match area {
            Area::Program => (0, self.program_len, PROG_MEM_SIZE),
            Area::Immediate => (IMM_START as usize, self.imm_len, IMM_MEM_SIZE),
        }
    }

    /// Step where the next appended token will land.
    pub fn next_token_step(&self, area: Area) -> u16 {
        let (start, used, _) = self.area_bounds(area);
        (start + used) as u16
    }

    // ---- appending tokens (parse time) ----

    fn append_record(&mut self, area: Area, record: &[u8]) -> Result<u16, ()> {
        let (start, used, capacity) = self.area_bounds(area);
        // keep room for the terminating no-token byte
        if used + record.len() + 1 > capacity {
            return Err(());
        }
        let at = start + used;
        self.bytes[at..at + record.len()].copy_from_slice(record);
        self.bytes[at + record.len()] = TokenType::NoToken as u8;
        match area {
            Area::Program => self.program_len += record.len(),
            Area::Immediate => self.imm_len += record.len(),
        }
        Ok(at as u16)
    }

    /// Appends a reserved word token; block commands get a 16-bit token step
    /// field (patched later while the block chain is being linked).
    pub fn append_resword(&mut self, area: Area, cmd_index: u8, is_block: bool) -> Result<u16, ()> {
        let len: u8 = if is_block { 4 } else { 2 };
        let header = TokenType::ReservedWord as u8 | (len << 4);
        if is_block {
            self.append_record(area, &[header, cmd_index, 0, 0])
        } else {
            self.append_record(area, &[header, cmd_index])
        }
    }

    pub fn append_internal_function(&mut self, area: Area, fn_index: u8) -> Result<u16, ()> {
        let header = TokenType::InternalFunction as u8 | (2 << 4);
        self.append_record(area, &[header, fn_index])
    }

    pub fn append_user_function(&mut self, area: Area, name_index: u8) -> Result<u16, ()> {
        let header = TokenType::UserFunction as u8 | (2 << 4);
        self.append_record(area, &[header, name_index])
    }

    pub fn append_variable(
        &mut self,
        area: Area,
        attrib_byte: u8,
        name_index: u8,
        value_index: u8,
    ) -> Result<u16, ()> {
        let header = TokenType::Variable as u8 | (4 << 4);
        self.append_record(area, &[header, attrib_byte, name_index, value_index])
    }

    /// Appends a constant token; the high nibble of the header carries the
    /// value kind, the payload the value itself (or the string pool index).
    pub fn append_constant(
        &mut self,
        area: Area,
        value: &Value,
        counters: &mut HeapCounters,
    ) -> Result<u16, ()> {
        let (kind, payload) = match value {
            Value::Long(v) => (ValueKind::Long, *v as u32),
            Value::Float(v) => (ValueKind::Float, v.to_bits()),
            Value::Str(s) => (ValueKind::Str, self.intern_string(s.clone(), counters)),
        };
        let header = TokenType::Constant as u8 | ((kind as u8) << 4);
        let b = payload.to_le_bytes();
        self.append_record(area, &[header, b[0], b[1], b[2], b[3]])
    }

    /// Appends a generic name token (program names, deletable identifiers).
    pub fn append_generic_name(
        &mut self,
        area: Area,
        name: &str,
        counters: &mut HeapCounters,
    ) -> Result<u16, ()> {
        let index = self.intern_string(Some(name.to_string()), counters);
        let header = TokenType::GenericName as u8 | (5 << 4);
        let b = index.to_le_bytes();
        self.append_record(area, &[header, b[0], b[1], b[2], b[3]])
    }

    pub fn append_terminal(&mut self, area: Area, code: TermCode) -> Result<u16, ()> {
        let index = code as u8;
        let group = match index {
            0x00..=0x0F => TokenType::TerminalGroup1,
            0x10..=0x1F => TokenType::TerminalGroup2,
            _ => TokenType::TerminalGroup3,
        };
        let header = group as u8 | ((index & 0x0F) << 4);
        self.append_record(area, &[header])
    }

    // ---- reading tokens ----

    pub fn token_type(&self, step: u16) -> TokenType {
        TokenType::try_from(self.bytes[step as usize] & 0x0F).unwrap_or(TokenType::NoToken)
    }

    pub fn token_len(&self, step: u16) -> usize {
        let header = self.bytes[step as usize];
        match self.token_type(step) {
            t if t.is_terminal() => TERMINAL_TOKEN_LEN,
            TokenType::Constant => CONSTANT_TOKEN_LEN,
            _ => ((header >> 4) & 0x0F) as usize,
        }
    }

    pub fn next_step(&self, step: u16) -> u16 {
        step + self.token_len(step) as u16
    }

    /// Jumps `n` tokens forward; `None` once the end of the area is reached.
    pub fn jump_tokens(&self, mut step: u16, n: usize) -> Option<u16> {
        for _ in 0..n {
            if self.token_type(step) == TokenType::NoToken {
                return None;
            }
            step = self.next_step(step);
        }
        if self.token_type(step) == TokenType::NoToken { None } else { Some(step) }
    }

    /// Combined terminal index (0..47) of a terminal token.
    pub fn terminal_index(&self, step: u16) -> u8 {
        let header = self.bytes[step as usize];
        let base = match self.token_type(step) {
            TokenType::TerminalGroup2 => 0x10,
            TokenType::TerminalGroup3 => 0x20,
            _ => 0x00,
        };
        base + ((header >> 4) & 0x0F)
    }

    pub fn terminal_code(&self, step: u16) -> TermCode {
        terminal_def(self.terminal_index(step)).code
    }

    pub fn resword_index(&self, step: u16) -> u8 {
        self.bytes[step as usize + 1]
    }

    /// The 16-bit block-chain link of a block command token.
    pub fn block_step(&self, step: u16) -> u16 {
        let mut index = step as usize + 2;
        read_u16(&self.bytes, &mut index)
    }

    pub fn set_block_step(&mut self, step: u16, to: u16) {
        let mut index = step as usize + 2;
        write_u16(&mut self.bytes, &mut index, to);
    }

    pub fn function_index(&self, step: u16) -> u8 {
        self.bytes[step as usize + 1]
    }

    /// Variable token fields: (attribute byte, name index, value index).
    pub fn variable_token(&self, step: u16) -> (u8, u8, u8) {
        let at = step as usize;
        (self.bytes[at + 1], self.bytes[at + 2], self.bytes[at + 3])
    }

    pub fn constant_kind(&self, step: u16) -> ValueKind {
        ValueKind::try_from((self.bytes[step as usize] >> 4) & 0x07).unwrap_or(ValueKind::None)
    }

    pub fn constant_value(&self, step: u16) -> Value {
        let mut index = step as usize + 1;
        let payload = read_u32(&self.bytes, &mut index);
        match self.constant_kind(step) {
            ValueKind::Long => Value::Long(payload as i32),
            ValueKind::Float => Value::Float(f32::from_bits(payload)),
            _ => Value::Str(self.pool_string(payload).map(str::to_string)),
        }
    }

    pub fn generic_name(&self, step: u16) -> &str {
        let mut index = step as usize + 1;
        let payload = read_u32(&self.bytes, &mut index);
        self.pool_string(payload).unwrap_or("")
    }

    /// Finds the next reserved word token with the given command code,
    /// starting after `step`.
    pub fn find_resword(&self, step: u16, code: crate::global::token_codes::CmdCode) -> Option<u16> {
        self.find_from(self.next_step(step), |p, s| {
            p.token_type(s) == TokenType::ReservedWord
                && command_def(p.resword_index(s)).code == code
        })
    }

    /// Finds the next terminal token with the given code, starting after `step`.
    pub fn find_terminal(&self, step: u16, code: TermCode) -> Option<u16> {
        self.find_from(self.next_step(step), |p, s| {
            p.token_type(s).is_terminal() && p.terminal_code(s) == code
        })
    }

    fn find_from(&self, mut step: u16, pred: impl Fn(&Self, u16) -> bool) -> Option<u16> {
        while self.token_type(step) != TokenType::NoToken {
            if pred(self, step) {
                return Some(step);
            }
            step = self.next_step(step);
        }
        None
    }

    // ---- parsed string pool ----

    fn intern_string(&mut self, s: Option<String>, counters: &mut HeapCounters) -> u32 {
        match s {
            None => EMPTY_STRING,
            Some(s) if s.is_empty() => EMPTY_STRING,
            Some(s) => {
                counters.parsed_string_consts += 1;
                self.strings.push(Some(s));
                (self.strings.len() - 1) as u32
            }
        }
    }

    fn pool_string(&self, index: u32) -> Option<&str> {
        if index == EMPTY_STRING {
            return None;
        }
        self.strings.get(index as usize).and_then(|s| s.as_deref())
    }

    fn free_area_strings(&mut self, area: Area, counters: &mut HeapCounters) {
        let (start, used, _) = self.area_bounds(area);
        let mut step = start as u16;
        while (step as usize) < start + used && self.token_type(step) != TokenType::NoToken {
            let is_string_const = self.token_type(step) == TokenType::Constant
                && self.constant_kind(step) == ValueKind::Str;
            if is_string_const || self.token_type(step) == TokenType::GenericName {
                let mut index = step as usize + 1;
                let payload = read_u32(&self.bytes, &mut index);
                if payload != EMPTY_STRING {
                    if let Some(slot) = self.strings.get_mut(payload as usize) {
                        if slot.take().is_some() {
                            counters.parsed_string_consts -= 1;
                        }
                    }
                }
            }
            step = self.next_step(step);
        }
    }

    /// Verifies the block linkage invariant: from every block start token,
    /// following the token step chain reaches an end token whose back link
    /// points at the start.
    pub fn verify_block_links(&self) -> bool {
        for area in [Area::Program, Area::Immediate] {
            let mut step = self.area_start(area);
            while self.token_type(step) != TokenType::NoToken {
                if self.token_type(step) == TokenType::ReservedWord {
                    let def = command_def(self.resword_index(step));
                    let starts_block = def.block.pos == crate::global::commands::BlockPos::Start;
                    if starts_block && !self.block_chain_closes(step) {
                        return false;
                    }
                }
                step = self.next_step(step);
            }
        }
        true
    }

    fn block_chain_closes(&self, start: u16) -> bool {
        let mut at = self.block_step(start);
        for _ in 0..MAX_BLOCK_CHAIN {
            if self.token_type(at) != TokenType::ReservedWord {
                return false;
            }
            let def = command_def(self.resword_index(at));
            if def.block.block_type == crate::global::commands::BlockType::GenericEnd {
                return self.block_step(at) == start;
            }
            at = self.block_step(at);
        }
        false
    }

    /// Discards the immediate-mode command line (freeing its parsed strings).
    pub fn clear_immediate(&mut self, counters: &mut HeapCounters) {
        self.free_area_strings(Area::Immediate, counters);
        let start = IMM_START as usize;
        self.bytes[start..start + self.imm_len + 1].fill(0);
        self.imm_len = 0;
    }

    /// Discards the parsed program (freeing its parsed strings).
    pub fn clear_program(&mut self, counters: &mut HeapCounters) {
        self.free_area_strings(Area::Program, counters);
        self.bytes[0..self.program_len + 1].fill(0);
        self.program_len = 0;
    }
}
