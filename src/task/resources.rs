use assign_resources::assign_resources;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::InterruptHandler;
use embassy_rp::{bind_interrupts, peripherals};

// group the peripherals into resources, to be used in the tasks
// the resources are assigned to the tasks in main.rs
assign_resources! {
    wifi: WifiResources {
        pwr_pin: PIN_23,
        cs_pin: PIN_25,
        pio_sm: PIO0,
        dio_pin: PIN_24,
        clk_pin: PIN_29,
        dma_ch: DMA_CH0,
    },
    relay: RelayResources {
        relay_pin: PIN_15,
    },
    flash: FlashResources {
        flash: FLASH,
        dma_ch: DMA_CH1,
    },
    watchdog: WatchdogResources {
        watchdog: WATCHDOG,
    },
}

bind_interrupts!(pub struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});
