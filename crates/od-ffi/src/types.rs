use crate::error::set_last_error;

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ODStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorModelLoad = 2,
    ErrorNotLoaded = 3,
    ErrorGenerate = 4,
    ErrorInternal = 5,
}

/// Parameters controlling greedy generation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ODGenerateParams {
    pub max_new_tokens: u32,
    /// Token id that ends generation; negative uses the model's configured
    /// end-of-sequence id. Must fit in 32 bits otherwise.
    pub stop_token_id: i64,
    pub skip_special_tokens: bool,
}

impl Default for ODGenerateParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 64,
            stop_token_id: -1,
            skip_special_tokens: true,
        }
    }
}

impl ODGenerateParams {
    /// Convert to runtime parameters. A `stop_token_id` of 2^32 or more is
    /// rejected with `ErrorInvalidArgument`.
    pub(crate) fn to_params(self) -> Result<od_runtime::GenerateParams, ODStatus> {
        let stop_token_id = match self.stop_token_id {
            id if id < 0 => None,
            id => match u32::try_from(id) {
                Ok(id) => Some(id),
                Err(_) => {
                    set_last_error(format!("stop_token_id {} is out of range", id));
                    return Err(ODStatus::ErrorInvalidArgument);
                }
            },
        };
        Ok(od_runtime::GenerateParams {
            max_new_tokens: self.max_new_tokens as usize,
            stop_token_id,
            skip_special_tokens: self.skip_special_tokens,
        })
    }
}

/// Callback receiving each generated token id and the text it completes.
///
/// The text pointer is only valid for the duration of the call.
pub type ODStreamCallback = Option<
    extern "C" fn(
        token_id: u32,
        fragment: *const std::os::raw::c_char,
        user_data: *mut std::os::raw::c_void,
    ),
>;
