use rand::Rng;

pub const CODE_MIN: i32 = 1000;
pub const CODE_MAX: i32 = 9999;

/// Uniform random 4-digit code.
pub fn generate() -> i32 {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX)
}

pub fn is_valid(code: i32) -> bool {
    (CODE_MIN..=CODE_MAX).contains(&code)
}
