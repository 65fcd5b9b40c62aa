// Hard caps that keep one tenant or one request from exhausting the process.

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_BOOKINGS_PER_APARTMENT: usize = 10_000;
pub const MAX_STAY_NIGHTS: u32 = 366;
pub const MIN_GUESTS: u8 = 1;
pub const MAX_GUESTS: u8 = 10;

pub const MAX_RULES: usize = 10_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_EMAIL_LEN: usize = 320;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
