use defmt_rtt as _;
use panic_probe as _;
use corvid_cortex_m33 as corvid;
use stm32f7xx_hal::rcc::Clocks;
use stm32f7xx_hal::{pac, prelude::*};

pub const IDLE_STACK_SIZE: usize = 256;
pub const TASK_STACK_SIZE: usize = 2048;

defmt::timestamp!("{=u64:us}", corvid::current_tick());

pub struct KernelResources {
    pub clocks: Clocks,
}

pub fn setup() -> KernelResources {
    let pac_periph = pac::Peripherals::take().unwrap();
    let rcc = pac_periph.RCC.constrain();
    let clocks = rcc.cfgr.sysclk(16_000_000.Hz()).freeze();

    KernelResources { clocks }
}
